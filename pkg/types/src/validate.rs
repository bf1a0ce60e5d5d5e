use anyhow::{Result, bail};

/// Validate a reservation TTL in seconds.
/// The renewal period is `ttl / 3`, so it must be strictly positive.
pub fn validate_ttl(ttl: i64) -> Result<()> {
    if ttl <= 0 {
        bail!("ttl must be positive (got {})", ttl);
    }
    Ok(())
}

/// Validate a reservation id: non-empty, no whitespace or control characters.
pub fn validate_safe_point_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("safe point id must not be empty");
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("safe point id '{}' must not contain whitespace", id.escape_debug());
    }
    Ok(())
}
