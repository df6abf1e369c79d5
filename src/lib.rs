pub mod auth;
pub mod config;
pub mod dates;
pub mod desk;
pub mod feed;
pub mod limits;
pub mod model;
pub mod observability;
pub mod policy;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod sql;
pub mod status;
pub mod store;
pub mod tls;
pub mod wal;
pub mod wire;
