pub mod cast;
pub mod config;
pub mod error;
pub mod index;
pub mod link;
pub mod rotate;
pub mod web;
pub mod tasks {
    pub mod advance;
    pub mod availability;
    pub mod indexer;
}
