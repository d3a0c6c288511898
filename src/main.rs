use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::error;

use posture_face::bootstrap::{self, Outcome, Plan, PlanOptions, SystemShell};
use posture_face::config::Config;
use posture_face::error::Error;
use posture_face::permissions::Permission;
use posture_face::reset::{self, Store};
use posture_face::service::{self, UnitOptions};
use posture_face::users::{self, AdminError, Assignment, UserKey};
use posture_face::{db, mail, secret};

#[derive(Parser, Debug)]
#[clap(author, version, about = "posture-face operations")]
struct Cli {
    /// Settings file of KEY=VALUE lines.
    #[clap(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install system packages, the conda environment and dependencies.
    Bootstrap(BootstrapArgs),
    /// Validate the settings file and print it with secrets redacted.
    Config,
    /// Drop and recreate a store's tables.
    Reset {
        #[clap(value_enum)]
        target: ResetTarget,
    },
    /// Database administration.
    #[clap(subcommand)]
    Db(DbCommand),
    /// User administration.
    #[clap(subcommand)]
    Users(UsersCommand),
    /// Run the backend service in the foreground.
    Serve,
    /// Print a systemd unit that keeps the service running.
    Unit(UnitArgs),
    /// Generate a value for SECRET_KEY or SUPER_USER_TOKEN.
    Keygen {
        #[clap(
            long,
            default_value_t = secret::DEFAULT_KEY_BYTES as u64,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        bytes: u64,
    },
    /// Send a test message through the configured SMTP relay.
    MailCheck {
        #[clap(long)]
        to: String,
    },
}

#[derive(Args, Debug)]
struct BootstrapArgs {
    /// Print the plan instead of running it.
    #[clap(long)]
    dry_run: bool,
    /// JSON plan replacing the built-in one.
    #[clap(long)]
    plan: Option<PathBuf>,
    #[clap(long, default_value = "posture-face")]
    conda_env: String,
    #[clap(long, default_value = "3.10")]
    python: String,
    #[clap(long, default_value = "requirements.txt")]
    requirements: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResetTarget {
    Users,
    Faces,
    All,
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// List databases.
    Databases,
    /// List tables of the public schema.
    Tables,
    /// CREATE EXTENSION IF NOT EXISTS "uuid-ossp".
    EnableUuid,
    /// Row counts of users and faces.
    Status,
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    /// Show the first user matching attr=value (attr is id, email or name).
    Find { key: String },
    /// UPDATE users SET <column=value> WHERE <column=value>.
    Update {
        #[clap(long)]
        set: String,
        #[clap(long = "where")]
        condition: String,
    },
    /// Seed an account.
    Create {
        #[clap(long)]
        email: String,
        #[clap(long)]
        name: String,
        #[clap(long)]
        password: String,
    },
    /// Delete every user matching attr=value.
    Delete { key: String },
    /// Exit 0 if the user holds the permission, 2 if not.
    Check { key: String, permission: String },
    /// Grant one permission, e.g. grant-permission.
    Grant { key: String, permission: String },
    /// Revoke one permission.
    Revoke { key: String, permission: String },
    /// Check a password against the stored hash; exit 2 on mismatch.
    CheckPassword {
        key: String,
        #[clap(long)]
        password: String,
    },
}

#[derive(Args, Debug)]
struct UnitArgs {
    /// Account the service runs as.
    #[clap(long)]
    user: Option<String>,
    /// Write the unit here instead of stdout.
    #[clap(long)]
    output: Option<PathBuf>,
}

/// Exit status of a check that ran and came out negative.
const CHECK_FAILED: i32 = 2;

fn verdict(holds: bool, yes: &str, no: &str) -> i32 {
    if holds {
        println!("{}", yes);
        0
    } else {
        println!("{}", no);
        CHECK_FAILED
    }
}

fn absolute(path: &Path) -> Result<PathBuf, Error> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn parse_key(key: &str) -> Result<UserKey, AdminError> {
    key.parse()
}

fn parse_permission(permission: &str) -> Result<Permission, AdminError> {
    permission.parse().map_err(AdminError::Permission)
}

fn bootstrap(args: &BootstrapArgs) -> Result<(), Error> {
    let plan = match &args.plan {
        Some(path) => Plan::from_file(path)?,
        None => Plan::standard(&PlanOptions {
            conda_env: args.conda_env.clone(),
            python: args.python.clone(),
            requirements: args.requirements.clone(),
        }),
    };

    if args.dry_run {
        print!("{}", bootstrap::describe(&plan));
        return Ok(());
    }

    for (step, outcome) in bootstrap::run(&plan, &mut SystemShell)? {
        match outcome {
            Outcome::Skipped => println!("{}: already satisfied", step),
            Outcome::Ran => println!("{}: done", step),
        }
    }
    Ok(())
}

fn database(config: &Config, command: &DbCommand) -> Result<(), Error> {
    let mut conn = db::establish(&config.database_url)?;
    match command {
        DbCommand::Databases => {
            for name in db::list_databases(&mut conn)? {
                println!("{}", name);
            }
        }
        DbCommand::Tables => {
            for name in db::list_tables(&mut conn)? {
                println!("{}", name);
            }
        }
        DbCommand::EnableUuid => db::enable_uuid_extension(&mut conn)?,
        DbCommand::Status => {
            let status = db::status(&mut conn)?;
            println!("users: {}", status.users);
            println!("faces: {}", status.faces);
        }
    }
    Ok(())
}

fn user_admin(config: &Config, command: &UsersCommand) -> Result<i32, Error> {
    let mut conn = db::establish(&config.database_url)?;
    match command {
        UsersCommand::Find { key } => {
            let user = users::find(&mut conn, &parse_key(key)?)?;
            println!("id:          {}", user.id);
            println!("created_at:  {}", user.created_at.to_rfc3339());
            println!("email:       {}", user.email.as_deref().unwrap_or("-"));
            println!("name:        {}", user.name.as_deref().unwrap_or("-"));
            println!("is_verified: {}", user.is_verified.unwrap_or(false));
            println!("permissions: {} ({})", user.permissions(), user.permissions);
        }
        UsersCommand::Update { set, condition } => {
            let set: Assignment = set.parse()?;
            let condition: Assignment = condition.parse()?;
            let changed = users::update(&mut conn, &set, &condition)?;
            println!("{} row(s) updated", changed);
        }
        UsersCommand::Delete { key } => {
            let deleted = users::delete(&mut conn, &parse_key(key)?)?;
            println!("{} user(s) deleted", deleted);
        }
        UsersCommand::Check { key, permission } => {
            let holds =
                users::has_permission(&mut conn, &parse_key(key)?, parse_permission(permission)?)?;
            return Ok(verdict(holds, "permission held", "permission not held"));
        }
        UsersCommand::Create {
            email,
            name,
            password,
        } => {
            let user = users::create(&mut conn, email, name, password, config.default_verified)?;
            println!("{}", user.id);
        }
        UsersCommand::Grant { key, permission } => {
            let permissions =
                users::grant(&mut conn, &parse_key(key)?, parse_permission(permission)?)?;
            println!("{}", permissions);
        }
        UsersCommand::Revoke { key, permission } => {
            let permissions =
                users::revoke(&mut conn, &parse_key(key)?, parse_permission(permission)?)?;
            println!("{}", permissions);
        }
        UsersCommand::CheckPassword { key, password } => {
            let matches = users::check_password(&mut conn, &parse_key(key)?, password)?;
            return Ok(verdict(matches, "password matches", "password does not match"));
        }
    }
    Ok(0)
}

fn unit(cli: &Cli, args: &UnitArgs) -> Result<(), Error> {
    let options = UnitOptions {
        exe: std::env::current_exe()?,
        env_file: absolute(&cli.env_file)?,
        working_dir: std::env::current_dir()?,
        user: args.user.clone(),
    };
    let text = service::render_unit(&options);
    match &args.output {
        Some(path) => fs::write(path, text)?,
        None => print!("{}", text),
    }
    Ok(())
}

/// Run the command and return the process exit status.
fn run(cli: Cli) -> Result<i32, Error> {
    // bootstrap, unit and keygen work before a settings file exists
    let load = || Config::from_file(&cli.env_file);
    match &cli.command {
        Commands::Bootstrap(args) => bootstrap(args)?,
        Commands::Unit(args) => unit(&cli, args)?,
        Commands::Keygen { bytes } => {
            println!("{}", secret::generate_secret_key(*bytes as usize)?)
        }
        Commands::Config => println!("{:#?}", load()?),
        Commands::Reset { target } => {
            let config = load()?;
            match target {
                ResetTarget::Users => reset::reset(&config, Store::Users)?,
                ResetTarget::Faces => reset::reset(&config, Store::Faces)?,
                ResetTarget::All => reset::reset_all(&config)?,
            }
        }
        Commands::Db(command) => database(&load()?, command)?,
        Commands::Users(command) => return user_admin(&load()?, command),
        Commands::Serve => {
            let config = load()?;
            actix_web::rt::System::new().block_on(service::run(&config))?
        }
        Commands::MailCheck { to } => mail::send_check(load()?.smtp.as_ref(), to)?,
    }
    Ok(0)
}

/// API Guide (keep updated!)
/// - GET /health: process liveness
/// - GET /health/db: database round trip, 503 when unreachable
fn main() {
    let cli = Cli::parse();
    posture_face::init_logger();

    match run(cli) {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from([
            "posture-face",
            "users",
            "update",
            "--set",
            "is_verified=true",
            "--where",
            "email=a@b.c",
        ])
        .unwrap();
        match cli.command {
            Commands::Users(UsersCommand::Update { set, condition }) => {
                assert_eq!(set, "is_verified=true");
                assert_eq!(condition, "email=a@b.c");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_env_file_is_global() {
        let cli =
            Cli::try_parse_from(["posture-face", "reset", "all", "--env-file", "/etc/pf.env"])
                .unwrap();
        assert_eq!(cli.env_file, PathBuf::from("/etc/pf.env"));
        assert!(matches!(
            cli.command,
            Commands::Reset {
                target: ResetTarget::All
            }
        ));
    }

    #[test]
    fn test_parse_delete_and_check() {
        let cli = Cli::try_parse_from(["posture-face", "users", "delete", "email=a@b.c"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Users(UsersCommand::Delete { ref key }) if key == "email=a@b.c"
        ));

        let cli = Cli::try_parse_from([
            "posture-face",
            "users",
            "check",
            "name=admin",
            "delete-users",
        ])
        .unwrap();
        match cli.command {
            Commands::Users(UsersCommand::Check { key, permission }) => {
                assert_eq!(key, "name=admin");
                assert_eq!(permission, "delete-users");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keygen_bytes() {
        let cli = Cli::try_parse_from(["posture-face", "keygen"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen { bytes: 32 }));
        assert!(Cli::try_parse_from(["posture-face", "keygen", "--bytes", "0"]).is_err());
    }

    #[test]
    fn test_verdict() {
        assert_eq!(verdict(true, "yes", "no"), 0);
        assert_eq!(verdict(false, "yes", "no"), CHECK_FAILED);
    }
}
