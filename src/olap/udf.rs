//! User-defined MDX functions.
//!
//! A function is registered on the session builder and called by name from
//! any MDX expression. Built-in functions take precedence.
//!
//! ```ignore
//! let session = Session::builder(schema, conn)
//!     .udf(udf_fn("PlusOne", &[UdfType::Numeric], UdfType::Numeric, |args| {
//!         Ok(CellValue::Number(args[0].as_f64().unwrap_or(0.0) + 1.0))
//!     }))
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use super::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdfType {
    Numeric,
    String,
    Boolean,
    Any,
}

impl UdfType {
    /// Whether an argument value fits this parameter. Empty fits any
    /// parameter type.
    pub fn accepts(self, value: &CellValue) -> bool {
        match (self, value) {
            (UdfType::Any, _) | (_, CellValue::Empty) => true,
            (UdfType::Numeric, CellValue::Number(_)) => true,
            (UdfType::String, CellValue::Text(_)) => true,
            (UdfType::Boolean, CellValue::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UdfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UdfType::Numeric => "Numeric",
            UdfType::String => "String",
            UdfType::Boolean => "Logical",
            UdfType::Any => "Value",
        };
        write!(f, "{name}")
    }
}

/// A scalar function callable from MDX.
///
/// `execute` receives arguments already checked against
/// `parameter_types`. An `Err` becomes an error value in the cell; the
/// rest of the query still runs.
pub trait UserDefinedFunction: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn parameter_types(&self) -> &[UdfType];

    fn return_type(&self) -> UdfType;

    fn execute(&self, args: &[CellValue]) -> Result<CellValue, String>;

    /// `Name(Numeric, String)`, as shown in signature errors.
    fn signature(&self) -> String {
        let params = self
            .parameter_types()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name(), params)
    }

    /// Check `args` against the declared parameters.
    fn check_args(&self, args: &[CellValue]) -> Result<(), String> {
        let params = self.parameter_types();
        if params.len() != args.len() {
            return Err(format!(
                "{} expects {} argument(s), got {}",
                self.signature(),
                params.len(),
                args.len()
            ));
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            if !param.accepts(arg) {
                return Err(format!(
                    "argument {} of {} must be {}, got '{}'",
                    i + 1,
                    self.signature(),
                    param,
                    arg
                ));
            }
        }
        Ok(())
    }
}

struct FnUdf<F> {
    name: String,
    params: Vec<UdfType>,
    returns: UdfType,
    body: F,
}

impl<F> UserDefinedFunction for FnUdf<F>
where
    F: Fn(&[CellValue]) -> Result<CellValue, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_types(&self) -> &[UdfType] {
        &self.params
    }

    fn return_type(&self) -> UdfType {
        self.returns
    }

    fn execute(&self, args: &[CellValue]) -> Result<CellValue, String> {
        (self.body)(args)
    }
}

/// Wrap a closure as a [`UserDefinedFunction`].
pub fn udf_fn<F>(
    name: &str,
    params: &[UdfType],
    returns: UdfType,
    body: F,
) -> Arc<dyn UserDefinedFunction>
where
    F: Fn(&[CellValue]) -> Result<CellValue, String> + Send + Sync + 'static,
{
    Arc::new(FnUdf {
        name: name.to_string(),
        params: params.to_vec(),
        returns,
        body,
    })
}
