table! {
    users (id) {
        id -> Uuid,
        created_at -> Timestamptz,
        email -> Nullable<Varchar>,
        password_hash -> Nullable<Varchar>,
        name -> Nullable<Varchar>,
        is_verified -> Nullable<Bool>,
        permissions -> Int2,
    }
}

table! {
    faces (id) {
        id -> Uuid,
        uploaded_at -> Timestamptz,
        uploaded_by -> Uuid,
        blob -> Bytea,
        feature -> Json,
        description -> Nullable<Varchar>,
    }
}

allow_tables_to_appear_in_same_query!(faces, users);
