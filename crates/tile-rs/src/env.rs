use std::env;
use std::sync::OnceLock;

/// Tile count of a second generation IPU.
pub const DEFAULT_NUM_TILES: u32 = 1472;
/// Cycle estimate attached to every data-barrier vertex.
pub const DEFAULT_BARRIER_PERF_ESTIMATE: u64 = 14;

static TILE_RS_NUM_TILES: OnceLock<u32> = OnceLock::new();
static TILE_RS_BARRIER_PERF_ESTIMATE: OnceLock<u64> = OnceLock::new();

fn parse_positive<T>(name: &str, value: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Some(parsed),
        _ => {
            log::warn!("ignoring invalid value '{value}' for {name}");
            None
        }
    }
}

fn read_env<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_positive(name, &value).unwrap_or(default),
        _ => default,
    }
}

/// Number of tiles of the default target (`TILE_RS_NUM_TILES`).
pub fn num_tiles() -> u32 {
    *TILE_RS_NUM_TILES.get_or_init(|| read_env("TILE_RS_NUM_TILES", DEFAULT_NUM_TILES))
}

/// Perf estimate of barrier vertices (`TILE_RS_BARRIER_PERF_ESTIMATE`).
pub fn barrier_perf_estimate() -> u64 {
    *TILE_RS_BARRIER_PERF_ESTIMATE.get_or_init(|| {
        read_env(
            "TILE_RS_BARRIER_PERF_ESTIMATE",
            DEFAULT_BARRIER_PERF_ESTIMATE,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_rejects_zero_and_garbage() {
        assert_eq!(parse_positive::<u32>("X", "16"), Some(16));
        assert_eq!(parse_positive::<u32>("X", " 8 "), Some(8));
        assert_eq!(parse_positive::<u32>("X", "0"), None);
        assert_eq!(parse_positive::<u32>("X", "many"), None);
    }
}
