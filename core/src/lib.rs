pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod flusher;
pub mod migration;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use flusher::{spawn_configured, spawn_flusher, FlusherHandle};
pub use store::{Collaborators, FavoriteStore, TickOutcome, ToggleOutcome};
pub use sync::FavoritesChanged;
