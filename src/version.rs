/// Release builds stamp `SAVOR_BUILD_VERSION`; local builds fall back to the
/// crate version.
pub const VERSION: &str = match option_env!("SAVOR_BUILD_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

/// `User-Agent` sent with every API request.
pub fn user_agent() -> String {
    format!("savor/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        let ua = user_agent();
        assert!(ua.starts_with("savor/"));
        assert!(ua.ends_with(VERSION));
    }
}
