mod database;
mod favorite_repository;
mod kv_repository;
mod persistence;

pub use database::{Connection, Database};
pub use favorite_repository::FavoriteRepository;
pub use kv_repository::KvRepository;
pub use persistence::{FavoritePersistence, MemoryPersistence, PersistedFavorites, SqlitePersistence};
