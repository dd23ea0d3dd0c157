//! Process-wide configuration for a `serve` run. Constructed once in `main`
//! from `Cli` and handed to the `Hub` as a plain value — no hidden globals.

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grace_period_secs: u64,
    pub draw_offer_limit: u32,
    pub draw_offer_window_secs: u64,
    pub scan_interval_ms: u64,
    pub promotion_cancel_allowed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 40,
            draw_offer_limit: 3,
            draw_offer_window_secs: 60,
            scan_interval_ms: 100,
            promotion_cancel_allowed: true,
        }
    }
}
