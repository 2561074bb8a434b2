pub mod github;

pub use github::{Asset, Release, ReleaseClient};
