//! A small FoodMart: the 1997 sales of three product families in two
//! stores, a warehouse cube, and an HR cube over a parent-child employee
//! hierarchy.
//!
//! Unit sales per quarter of 1997:
//!
//! ```text
//!                 Q1      Q2      Q3      Q4
//! Drink         5976    5895    6065    6661
//! Food         47809   44825   47440   51866
//! Non-Consum.  12506   11890   12343   13497
//! total        66291   62610   65848   72024   = 266773
//! ```
//!
//! Each quarter's sales are booked in its first month. Every cell is split
//! into a female half (`unit / 2`, store 7 in Los Angeles) and a male half
//! (the rest, store 15 in Seattle). Customers 1 and 2 buy in Q1 and Q2,
//! customers 3 and 4 in Q3 and Q4. Store sales are twice the units and
//! store cost equals the units.
//!
//! Employees (salary in brackets, siblings in seniority order):
//!
//! ```text
//! Sheri Nowmer (1000)
//! ├── Maya Gutierrez (600)
//! │   ├── Darren Stanz (300)
//! │   │   ├── Beverly Baker (100)
//! │   │   └── Pedro Castillo (150)
//! │   └── Jonathan Murraiin (200)
//! ├── Michael Spence (500)
//! │   └── Laurie Borges (250)
//! └── Derrick Whelply (400)
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use cubist::config::Settings;
use cubist::connection::{CountingConnection, SqlConnection, SqliteConnection};
use cubist::olap::Session;
use cubist::schema::Schema;
use cubist::sql::{DatabaseProduct, Dialect};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

pub const UNIT_SALES_1997: f64 = 266_773.0;
pub const QUARTERS_1997: [f64; 4] = [66_291.0, 62_610.0, 65_848.0, 72_024.0];

/// (family, quarter) unit sales.
pub const CELLS: [[i64; 4]; 3] = [
    [5976, 5895, 6065, 6661],
    [47809, 44825, 47440, 51866],
    [12506, 11890, 12343, 13497],
];

/// Org Salary of the whole company.
pub const TOTAL_SALARY: f64 = 3500.0;

const SCHEMA: &str = r##"
name = "FoodMart"

[[dimension]]
name = "Time"
[[dimension.hierarchy]]
has_all = false
table = "time_by_day"
primary_key = "time_id"
level = [
  { name = "Year", column = "the_year" },
  { name = "Quarter", column = "quarter" },
  { name = "Month", column = "month_of_year" },
]

[[dimension]]
name = "Product"
[[dimension.hierarchy]]
table = "product"
primary_key = "product_id"
level = [
  { name = "Product Family", column = "product_family" },
  { name = "Product Category", column = "product_category" },
  { name = "Product Name", column = "product_name" },
]

[[dimension]]
name = "Store"
[[dimension.hierarchy]]
table = "store"
primary_key = "store_id"
level = [
  { name = "Store Country", column = "store_country" },
  { name = "Store State", column = "store_state" },
  { name = "Store City", column = "store_city" },
  { name = "Store Name", column = "store_name" },
]

[[dimension]]
name = "Gender"
[[dimension.hierarchy]]
table = "customer"
primary_key = "customer_id"
all_member_name = "All Gender"
level = [{ name = "Gender", column = "gender" }]

[[dimension]]
name = "Employees"
[[dimension.hierarchy]]
all_member_name = "All Employees"
table = "employee"
primary_key = "employee_id"
level = [EMPLOYEE_LEVEL]

[[cube]]
name = "Sales"
fact_table = "sales_fact_1997"
dimension = [
  { name = "Time", source = "Time", foreign_key = "time_id" },
  { name = "Product", source = "Product", foreign_key = "product_id" },
  { name = "Store", source = "Store", foreign_key = "store_id" },
  { name = "Gender", source = "Gender", foreign_key = "customer_id" },
]
measure = [
  { name = "Unit Sales", column = "unit_sales", aggregator = "sum", format_string = "Standard" },
  { name = "Store Cost", column = "store_cost", aggregator = "sum", format_string = "#,###.00" },
  { name = "Store Sales", column = "store_sales", aggregator = "sum", format_string = "#,###.00" },
  { name = "Sales Count", column = "product_id", aggregator = "count", format_string = "#,###" },
  { name = "Customer Count", column = "customer_id", aggregator = "distinct-count", format_string = "#,###" },
]
calculated_member = [
  { name = "Profit", formula = "[Measures].[Store Sales] - [Measures].[Store Cost]", format_string = "$#,##0.00" },
]

[[cube]]
name = "Warehouse"
fact_table = "inventory_fact_1997"
dimension = [
  { name = "Time", source = "Time", foreign_key = "time_id" },
  { name = "Product", source = "Product", foreign_key = "product_id" },
  { name = "Store", source = "Store", foreign_key = "store_id" },
]
measure = [
  { name = "Units Shipped", column = "units_shipped", aggregator = "sum", format_string = "#.0" },
  { name = "Units Ordered", column = "units_ordered", aggregator = "sum", format_string = "#.0" },
]

[[virtual_cube]]
name = "Warehouse and Sales"
cubes = ["Sales", "Warehouse"]
dimensions = ["Time", "Product", "Store", "Gender"]
measure = [
  { cube = "Sales", name = "Unit Sales" },
  { cube = "Sales", name = "Store Sales" },
  { cube = "Warehouse", name = "Units Shipped" },
  { cube = "Warehouse", name = "Units Ordered" },
]

[[cube]]
name = "HR"
fact_table = "salary"
dimension = [
  { name = "Time", source = "Time", foreign_key = "time_id" },
  { name = "Employees", source = "Employees", foreign_key = "employee_id" },
]
measure = [
  { name = "Org Salary", column = "salary_paid", aggregator = "sum", format_string = "Currency" },
  { name = "Number of Employees", column = "employee_id", aggregator = "distinct-count", format_string = "#,#" },
]
"##;

const EMPLOYEE_LEVEL: &str = r#"{ name = "Employee Id", column = "employee_id", name_column = "full_name", parent_column = "supervisor_id", ordinal_column = "seniority" }"#;

const EMPLOYEE_LEVEL_CLOSURE: &str = r#"{ name = "Employee Id", column = "employee_id", name_column = "full_name", parent_column = "supervisor_id", ordinal_column = "seniority", closure = { table = "employee_closure", parent_column = "supervisor_id", child_column = "employee_id" } }"#;

const DIMENSION_TABLES: &str = "
CREATE TABLE product (
  product_id INTEGER PRIMARY KEY,
  product_family TEXT,
  product_category TEXT,
  product_name TEXT
);
INSERT INTO product VALUES
  (1, 'Drink', 'Alcoholic Beverages', 'Good Imported Beer'),
  (2, 'Food', 'Baked Goods', 'Modell Bagels'),
  (3, 'Non-Consumable', 'Household', 'Denny Paper Plates'),
  (4, 'Drink', 'Dairy', 'Booker 1% Milk');

CREATE TABLE store (
  store_id INTEGER PRIMARY KEY,
  store_country TEXT,
  store_state TEXT,
  store_city TEXT,
  store_name TEXT
);
INSERT INTO store VALUES
  (1, 'USA', 'CA', 'Los Angeles', 'Store 7'),
  (2, 'USA', 'WA', 'Seattle', 'Store 15'),
  (3, 'USA', 'OR', 'Portland', 'Store 11');

CREATE TABLE customer (
  customer_id INTEGER PRIMARY KEY,
  gender TEXT
);
INSERT INTO customer VALUES (1, 'F'), (2, 'M'), (3, 'F'), (4, 'M');

CREATE TABLE employee (
  employee_id INTEGER PRIMARY KEY,
  supervisor_id INTEGER,
  full_name TEXT,
  seniority INTEGER
);
INSERT INTO employee VALUES
  (1, NULL, 'Sheri Nowmer', 1),
  (2, 1, 'Derrick Whelply', 3),
  (3, 1, 'Michael Spence', 2),
  (4, 1, 'Maya Gutierrez', 1),
  (5, 4, 'Darren Stanz', 1),
  (6, 4, 'Jonathan Murraiin', 2),
  (7, 5, 'Beverly Baker', 1),
  (8, 5, 'Pedro Castillo', 2),
  (9, 3, 'Laurie Borges', 1);

CREATE TABLE employee_closure AS
WITH RECURSIVE closure(supervisor_id, employee_id, distance) AS (
  SELECT employee_id, employee_id, 0 FROM employee
  UNION ALL
  SELECT e.supervisor_id, c.employee_id, c.distance + 1
  FROM closure c JOIN employee e ON e.employee_id = c.supervisor_id
  WHERE e.supervisor_id IS NOT NULL
)
SELECT supervisor_id, employee_id, distance FROM closure;

CREATE TABLE salary (
  employee_id INTEGER,
  time_id INTEGER,
  salary_paid REAL
);
INSERT INTO salary VALUES
  (1, 1, 1000), (2, 1, 400), (3, 1, 500), (4, 1, 600), (5, 1, 300),
  (6, 1, 200), (7, 1, 100), (8, 1, 150), (9, 1, 250);

CREATE TABLE inventory_fact_1997 (
  time_id INTEGER,
  product_id INTEGER,
  store_id INTEGER,
  units_shipped INTEGER,
  units_ordered INTEGER
);
INSERT INTO inventory_fact_1997 VALUES
  (1, 1, 1, 100, 120),
  (1, 2, 1, 200, 210),
  (4, 2, 2, 300, 330);
";

/// Creates and fills the FoodMart tables.
pub fn foodmart_db() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(DIMENSION_TABLES).unwrap();

    conn.execute_batch(
        "CREATE TABLE time_by_day (
           time_id INTEGER PRIMARY KEY,
           the_year INTEGER,
           quarter TEXT,
           month_of_year INTEGER
         );
         CREATE TABLE sales_fact_1997 (
           time_id INTEGER,
           product_id INTEGER,
           store_id INTEGER,
           customer_id INTEGER,
           unit_sales INTEGER,
           store_cost INTEGER,
           store_sales INTEGER
         );",
    )
    .unwrap();
    let mut inserts = String::new();
    for (y, year) in [1997, 1998].into_iter().enumerate() {
        for month in 1..=12 {
            let time_id = y * 12 + month;
            let quarter = (month - 1) / 3 + 1;
            inserts.push_str(&format!(
                "INSERT INTO time_by_day VALUES ({time_id}, {year}, 'Q{quarter}', {month});\n"
            ));
        }
    }
    for (family, quarters) in CELLS.iter().enumerate() {
        let product_id = family + 1;
        for (q, units) in quarters.iter().enumerate() {
            let time_id = q * 3 + 1;
            let female = units / 2;
            let male = units - female;
            let (f_customer, m_customer) = if q < 2 { (1, 2) } else { (3, 4) };
            for (store_id, customer_id, units) in [(1, f_customer, female), (2, m_customer, male)] {
                inserts.push_str(&format!(
                    "INSERT INTO sales_fact_1997 VALUES ({time_id}, {product_id}, {store_id}, {customer_id}, {units}, {units}, {});\n",
                    2 * units
                ));
            }
        }
    }
    conn.execute_batch(&inserts).unwrap();
    conn
}

/// The FoodMart schema, with or without the employee closure table.
pub fn schema(closure: bool) -> Schema {
    let level = if closure {
        EMPLOYEE_LEVEL_CLOSURE
    } else {
        EMPLOYEE_LEVEL
    };
    Schema::from_toml(&SCHEMA.replace("EMPLOYEE_LEVEL", level)).unwrap()
}

pub fn sqlite() -> Dialect {
    Dialect::for_product(DatabaseProduct::Sqlite)
}

pub fn session() -> Session {
    session_with(Settings::default())
}

pub fn session_with(settings: Settings) -> Session {
    Session::builder(schema(false), Arc::new(foodmart_db()))
        .settings(settings)
        .build()
        .unwrap()
}

pub fn closure_session() -> Session {
    Session::builder(schema(true), Arc::new(foodmart_db()))
        .build()
        .unwrap()
}

/// A session whose statements are counted.
pub fn counting_session() -> (Session, Arc<CountingConnection>) {
    let counting = Arc::new(CountingConnection::new(Arc::new(foodmart_db())));
    let connection: Arc<dyn SqlConnection> = counting.clone();
    let session = Session::builder(schema(false), connection)
        .dialect(sqlite())
        .build()
        .unwrap();
    (session, counting)
}

pub fn settings(toml: &str) -> Settings {
    Settings::from_toml(toml).unwrap()
}

/// Checks that generated SQL parses as SQLite.
pub fn validate_sqlite(sql: &str) {
    if let Err(e) = Parser::parse_sql(&SQLiteDialect {}, sql) {
        panic!("invalid SQL: {e}\n{sql}");
    }
}

/// Value of the cell at `coordinates` as a number.
pub fn number(result: &cubist::olap::QueryResult, coordinates: &[usize]) -> f64 {
    result
        .cell(coordinates)
        .value()
        .as_f64()
        .unwrap_or_else(|| panic!("cell {coordinates:?} is not a number"))
}
