use failure::Fail;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigurationError;
use crate::db::SchemaError;
use crate::mail::MailError;
use crate::secret::SecretError;
use crate::service::ServiceError;
use crate::users::AdminError;

/// Everything a command can fail with.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Configuration error: {}", _0)]
    Configuration(#[fail(cause)] ConfigurationError),
    #[fail(display = "Schema error: {}", _0)]
    Schema(#[fail(cause)] SchemaError),
    #[fail(display = "Bootstrap error: {}", _0)]
    Bootstrap(#[fail(cause)] BootstrapError),
    #[fail(display = "User administration error: {}", _0)]
    Admin(#[fail(cause)] AdminError),
    #[fail(display = "Service error: {}", _0)]
    Service(#[fail(cause)] ServiceError),
    #[fail(display = "Mail error: {}", _0)]
    Mail(#[fail(cause)] MailError),
    #[fail(display = "Secret generation error: {}", _0)]
    Secret(#[fail(cause)] SecretError),
    #[fail(display = "IO error: {}", _0)]
    Io(#[fail(cause)] std::io::Error),
}

macro_rules! from_error {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Error::$variant(err)
                }
            }
        )*
    };
}

from_error! {
    ConfigurationError => Configuration,
    SchemaError => Schema,
    BootstrapError => Bootstrap,
    AdminError => Admin,
    ServiceError => Service,
    MailError => Mail,
    SecretError => Secret,
    std::io::Error => Io,
}
