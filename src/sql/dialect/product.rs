//! Database product classification.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::capabilities::{self, Capabilities};
use super::DialectError;

/// Every backend the engine knows how to talk to.
///
/// A connection maps to exactly one product. Variants of a common family
/// (Infobright on MySQL, Greenplum on PostgreSQL) are separate products
/// with their own capability tables, not subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DatabaseProduct {
    Access,
    Derby,
    Db2,
    Greenplum,
    Hive,
    Impala,
    Infobright,
    Informix,
    LucidDb,
    MsSql,
    MonetDb,
    MySql,
    Neoview,
    Netezza,
    NuoDb,
    Oracle,
    Postgresql,
    Sqlite,
    Teradata,
    Vectorwise,
    Vertica,
    Unknown,
}

impl DatabaseProduct {
    pub const ALL: [DatabaseProduct; 22] = [
        DatabaseProduct::Access,
        DatabaseProduct::Derby,
        DatabaseProduct::Db2,
        DatabaseProduct::Greenplum,
        DatabaseProduct::Hive,
        DatabaseProduct::Impala,
        DatabaseProduct::Infobright,
        DatabaseProduct::Informix,
        DatabaseProduct::LucidDb,
        DatabaseProduct::MsSql,
        DatabaseProduct::MonetDb,
        DatabaseProduct::MySql,
        DatabaseProduct::Neoview,
        DatabaseProduct::Netezza,
        DatabaseProduct::NuoDb,
        DatabaseProduct::Oracle,
        DatabaseProduct::Postgresql,
        DatabaseProduct::Sqlite,
        DatabaseProduct::Teradata,
        DatabaseProduct::Vectorwise,
        DatabaseProduct::Vertica,
        DatabaseProduct::Unknown,
    ];

    /// Upper-case product name, as used in configuration and logs.
    pub fn name(self) -> &'static str {
        match self {
            DatabaseProduct::Access => "ACCESS",
            DatabaseProduct::Derby => "DERBY",
            DatabaseProduct::Db2 => "DB2",
            DatabaseProduct::Greenplum => "GREENPLUM",
            DatabaseProduct::Hive => "HIVE",
            DatabaseProduct::Impala => "IMPALA",
            DatabaseProduct::Infobright => "INFOBRIGHT",
            DatabaseProduct::Informix => "INFORMIX",
            DatabaseProduct::LucidDb => "LUCIDDB",
            DatabaseProduct::MsSql => "MSSQL",
            DatabaseProduct::MonetDb => "MONETDB",
            DatabaseProduct::MySql => "MYSQL",
            DatabaseProduct::Neoview => "NEOVIEW",
            DatabaseProduct::Netezza => "NETEZZA",
            DatabaseProduct::NuoDb => "NUODB",
            DatabaseProduct::Oracle => "ORACLE",
            DatabaseProduct::Postgresql => "POSTGRESQL",
            DatabaseProduct::Sqlite => "SQLITE",
            DatabaseProduct::Teradata => "TERADATA",
            DatabaseProduct::Vectorwise => "VECTORWISE",
            DatabaseProduct::Vertica => "VERTICA",
            DatabaseProduct::Unknown => "UNKNOWN",
        }
    }

    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            DatabaseProduct::Access => &capabilities::ACCESS,
            DatabaseProduct::Derby => &capabilities::DERBY,
            DatabaseProduct::Db2 => &capabilities::DB2,
            DatabaseProduct::Greenplum => &capabilities::GREENPLUM,
            DatabaseProduct::Hive => &capabilities::HIVE,
            DatabaseProduct::Impala => &capabilities::IMPALA,
            DatabaseProduct::Infobright => &capabilities::INFOBRIGHT,
            DatabaseProduct::Informix => &capabilities::INFORMIX,
            DatabaseProduct::LucidDb => &capabilities::LUCIDDB,
            DatabaseProduct::MsSql => &capabilities::MSSQL,
            DatabaseProduct::MonetDb => &capabilities::MONETDB,
            DatabaseProduct::MySql => &capabilities::MYSQL,
            DatabaseProduct::Neoview => &capabilities::NEOVIEW,
            DatabaseProduct::Netezza => &capabilities::NETEZZA,
            DatabaseProduct::NuoDb => &capabilities::NUODB,
            DatabaseProduct::Oracle => &capabilities::ORACLE,
            DatabaseProduct::Postgresql => &capabilities::POSTGRESQL,
            DatabaseProduct::Sqlite => &capabilities::SQLITE,
            DatabaseProduct::Teradata => &capabilities::TERADATA,
            DatabaseProduct::Vectorwise => &capabilities::VECTORWISE,
            DatabaseProduct::Vertica => &capabilities::VERTICA,
            DatabaseProduct::Unknown => &capabilities::ANSI,
        }
    }

    /// MySQL and products speaking its dialect.
    pub fn is_mysql_family(self) -> bool {
        matches!(self, DatabaseProduct::MySql | DatabaseProduct::Infobright)
    }

    pub fn is_postgres_family(self) -> bool {
        matches!(self, DatabaseProduct::Postgresql | DatabaseProduct::Greenplum)
    }

    /// Classify from the driver-reported product name and version.
    ///
    /// This is the part of detection that needs no extra round trip.
    /// Family variants that can only be told apart by probing the server
    /// (Infobright, Greenplum) come back as their base product here.
    pub fn from_metadata(product_name: &str, product_version: &str) -> DatabaseProduct {
        let upper = product_name.to_uppercase();
        let version = product_version.to_uppercase();

        if upper == "ACCESS" || upper.contains("MS ACCESS") {
            DatabaseProduct::Access
        } else if upper.trim() == "APACHE DERBY" || upper.contains("DERBY") {
            DatabaseProduct::Derby
        } else if upper.starts_with("DB2") {
            DatabaseProduct::Db2
        } else if upper.contains("GREENPLUM") {
            DatabaseProduct::Greenplum
        } else if upper.contains("IMPALA") {
            DatabaseProduct::Impala
        } else if upper.contains("HIVE") || upper.contains("APACHE HIVE") {
            DatabaseProduct::Hive
        } else if upper.contains("INFOBRIGHT") {
            DatabaseProduct::Infobright
        } else if upper.starts_with("INFORMIX") {
            DatabaseProduct::Informix
        } else if upper == "INGRES" || upper.starts_with("INGRES") {
            if version.contains("VW") {
                DatabaseProduct::Vectorwise
            } else {
                DatabaseProduct::Unknown
            }
        } else if upper.contains("LUCIDDB") {
            DatabaseProduct::LucidDb
        } else if upper.contains("SQL SERVER") || upper.contains("MICROSOFT SQL") {
            DatabaseProduct::MsSql
        } else if upper.contains("MONETDB") {
            DatabaseProduct::MonetDb
        } else if upper.contains("MYSQL") || upper.contains("MARIADB") {
            DatabaseProduct::MySql
        } else if upper.contains("NEOVIEW") {
            DatabaseProduct::Neoview
        } else if upper.contains("NETEZZA") {
            DatabaseProduct::Netezza
        } else if upper.contains("NUODB") {
            DatabaseProduct::NuoDb
        } else if upper.contains("ORACLE") {
            DatabaseProduct::Oracle
        } else if upper.contains("POSTGRE") {
            DatabaseProduct::Postgresql
        } else if upper.contains("SQLITE") {
            DatabaseProduct::Sqlite
        } else if upper.contains("TERADATA") {
            DatabaseProduct::Teradata
        } else if upper.contains("VECTORWISE") {
            DatabaseProduct::Vectorwise
        } else if upper.contains("VERTICA") {
            DatabaseProduct::Vertica
        } else {
            DatabaseProduct::Unknown
        }
    }
}

impl fmt::Display for DatabaseProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatabaseProduct {
    type Err = DialectError;

    /// Accepts the upper-case name case-insensitively, plus a few common
    /// aliases (`postgres`, `sqlserver`, `mariadb`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let alias = match upper.as_str() {
            "POSTGRES" | "PG" => Some(DatabaseProduct::Postgresql),
            "SQLSERVER" | "TSQL" => Some(DatabaseProduct::MsSql),
            "MARIADB" => Some(DatabaseProduct::MySql),
            _ => None,
        };
        alias
            .or_else(|| {
                DatabaseProduct::ALL
                    .iter()
                    .copied()
                    .find(|p| p.name() == upper)
            })
            .ok_or_else(|| DialectError::UnknownProduct(s.to_string()))
    }
}
