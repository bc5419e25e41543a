pub mod auth;
pub mod logging;
pub mod tokens;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("grantor")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("GRANTOR_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = tokens::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: &str = "app1:s3cr3t:https://client.example/cb";

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "grantor");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_required() {
        temp_env::with_vars(
            [
                ("GRANTOR_SIGNING_KEY", None::<&str>),
                ("GRANTOR_CLIENTS", None),
                ("GRANTOR_PORT", None),
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "grantor",
                    "--port",
                    "9090",
                    "--signing-key",
                    "k3y",
                    "--client",
                    CLIENT,
                ]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
                assert_eq!(
                    matches
                        .get_one::<String>(tokens::ARG_SIGNING_KEY)
                        .map(String::as_str),
                    Some("k3y")
                );

                let result = new().try_get_matches_from(vec!["grantor", "--client", CLIENT]);
                assert_eq!(
                    result.map(|_| ()).map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("GRANTOR_PORT", Some("443")),
                ("GRANTOR_SIGNING_KEY", Some("k3y")),
                ("GRANTOR_CLIENTS", Some(CLIENT)),
                ("GRANTOR_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["grantor"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("GRANTOR_LOG_LEVEL", None::<&str>),
                    ("GRANTOR_SIGNING_KEY", Some("k3y")),
                    ("GRANTOR_CLIENTS", Some(CLIENT)),
                ],
                || {
                    let mut args = vec!["grantor".to_string()];
                    if index > 0 {
                        args.push(format!("-{}", "v".repeat(index)));
                    }

                    let matches = new().get_matches_from(args);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }
}
