use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let dsn = matches
        .get_one::<String>("dsn")
        .map(String::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?;

    let mut globals = GlobalArgs::new(
        matches
            .get_one::<String>("redis-url")
            .map(String::to_string)
            .unwrap_or_default(),
        matches
            .get_one::<String>("notification-url")
            .map(String::to_string)
            .unwrap_or_default(),
    );
    globals.set_secret_key(SecretString::from(
        matches
            .get_one::<String>("secret-key")
            .map(String::to_string)
            .unwrap_or_default(),
    ));

    let action = match matches.subcommand_name() {
        Some("cache-refresh") => Action::CacheRefresh { dsn },
        _ => Action::Server {
            port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
            dsn,
        },
    };

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn dispatch_defaults_to_server() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "custodia",
            "--dsn",
            "postgres://localhost/custodia",
            "--secret-key",
            "secret",
        ])?;
        let (action, globals) = handler(&matches)?;
        match action {
            Action::Server { port, dsn } => {
                assert_eq!(port, 8080);
                assert_eq!(dsn, "postgres://localhost/custodia");
            }
            Action::CacheRefresh { .. } => panic!("expected server action"),
        }
        assert_eq!(globals.secret_key.expose_secret(), "secret");
        Ok(())
    }

    #[test]
    fn dispatch_cache_refresh() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "custodia",
            "--dsn",
            "postgres://localhost/custodia",
            "--secret-key",
            "secret",
            "cache-refresh",
        ])?;
        let (action, _globals) = handler(&matches)?;
        assert!(matches!(action, Action::CacheRefresh { .. }));
        Ok(())
    }
}
