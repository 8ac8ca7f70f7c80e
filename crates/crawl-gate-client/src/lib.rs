pub mod fetcher;
pub mod robots;

pub use fetcher::ReqwestFetcher;
pub use robots::{RobotsPolicy, robots_url};
