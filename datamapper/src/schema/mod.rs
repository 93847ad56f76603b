pub mod ddl;
pub mod model;
pub mod parser;
pub mod types;

pub use ddl::{create_table_sql, create_tables_sql};
pub use model::{Model, Schema};
pub use parser::{parse_schema, parse_schema_str};
pub use types::*;
