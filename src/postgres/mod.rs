// PostgreSQL backend over tokio-postgres, driven from a private runtime:
// - config: options read from a connection target
// - params: ToSql for tagged values, adapted to declared parameter types
// - query: wire type + field tag -> tagged value
// - connection: the Backend/BackendConnection impls

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::PostgresOptions;
pub use connection::{PgStatement, PostgresBackend, PostgresConnection};
