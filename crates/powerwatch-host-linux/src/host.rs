//! Host identity

use tracing::warn;

/// The machine's hostname, or `"localhost"` if it cannot be read.
pub fn hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "Failed to read hostname");
            "localhost".to_string()
        }
    }
}

/// Client ID the daemon presents to the broker: `<hostname>/<app>`.
pub fn default_client_id(app: &str) -> String {
    format!("{}/{}", hostname(), app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_ends_with_app_name() {
        let id = default_client_id("powerwatchd");
        assert!(id.ends_with("/powerwatchd"));
        assert!(id.len() > "/powerwatchd".len());
    }
}
