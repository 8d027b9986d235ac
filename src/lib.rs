pub mod analysis_export;
pub mod coupon_analysis;
pub mod coupon_parse;
pub mod http_cache;
pub mod http_client;
pub mod odds_fetch;
pub mod state;
pub mod team_names;
pub mod valuation;
