//! DDL and DML text rendering.

use crate::types::{IndexSpec, TableDefinition};

/// Quote an identifier with double quotes, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` for a table definition.
pub fn create_table(def: &TableDefinition) -> String {
    let cols = def
        .columns()
        .iter()
        .map(|c| {
            format!(
                "{} {} {}",
                quote_ident(&c.name),
                c.storage_class.as_sql(),
                if c.required { "NOT NULL" } else { "NULL" }
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("CREATE TABLE IF NOT EXISTS {} ({cols});", quote_ident(&def.name))
}

/// `DROP TABLE IF EXISTS`.
pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table))
}

/// Deterministic index name: `IX_<table>_<col1>_<col2>...`.
pub fn index_name(table: &str, index: &IndexSpec) -> String {
    let mut name = format!("IX_{table}");
    for col in index.columns() {
        name.push('_');
        name.push_str(col);
    }
    name
}

/// `CREATE INDEX IF NOT EXISTS` for one index spec.
pub fn create_index(table: &str, index: &IndexSpec) -> String {
    let cols = index
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({cols});",
        quote_ident(&index_name(table, index)),
        quote_ident(table)
    )
}

/// `INSERT INTO <table> (<columns>) VALUES` without tuples.
pub fn insert_header(def: &TableDefinition) -> String {
    let cols = def
        .column_names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(",");
    format!("INSERT INTO {} ({cols}) VALUES", quote_ident(&def.name))
}
