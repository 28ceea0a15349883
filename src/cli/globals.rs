use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub secret_key: SecretString,
    pub redis_url: String,
    pub notification_url: String,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(redis_url: String, notification_url: String) -> Self {
        Self {
            secret_key: SecretString::default(),
            redis_url,
            notification_url,
        }
    }

    pub fn set_secret_key(&mut self, key: SecretString) {
        self.secret_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            "redis://127.0.0.1:6379/0".to_string(),
            "http://localhost".to_string(),
        );
        assert_eq!(args.redis_url, "redis://127.0.0.1:6379/0");
        assert_eq!(args.notification_url, "http://localhost");
        assert_eq!(args.secret_key.expose_secret(), "");
    }

    #[test]
    fn test_set_secret_key() {
        let mut args = GlobalArgs::new(String::new(), String::new());
        args.set_secret_key(SecretString::from("top-secret".to_string()));
        assert_eq!(args.secret_key.expose_secret(), "top-secret");
    }
}
