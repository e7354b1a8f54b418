//! Evaluated query results.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::context::{Context, TupleList};
use super::eval::{Datum, Evaluator, QueryState};
use super::format::{apply_formatter, format_value};
use super::member::Tuple;
use super::value::CellValue;
use super::{EvalError, EvalResult, OlapResult};
use crate::drillthrough;
use crate::mdx::SelectStatement;
use crate::schema::HierarchyId;

/// One tuple of an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub tuple: Tuple,
    pub unique_names: Vec<String>,
    pub captions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisResult {
    pub positions: Vec<Position>,
}

/// Axes and slicer of a `SELECT`, before cells are evaluated.
pub(crate) struct Layout {
    pub slicer: Context,
    /// Hierarchies the slicer sets, in the order it names them.
    pub slicer_hierarchies: Vec<HierarchyId>,
    /// Slicer tuples, one for a plain slicer, several for a compound one.
    pub slicer_tuples: Vec<Tuple>,
    pub axes: Vec<Vec<Tuple>>,
}

impl Layout {
    pub fn evaluate(ev: &Evaluator<'_>, select: &SelectStatement) -> EvalResult<Self> {
        let mut slicer = Context::new();
        let mut slicer_tuples = Vec::new();
        if let Some(expr) = &select.slicer {
            let tuples = match ev.eval(expr, &Context::new())? {
                Datum::Value(v) => {
                    return Err(EvalError::Type(format!(
                        "slicer '{expr}' evaluates to the value '{v}'"
                    )))
                }
                datum => ev.to_set(datum, &Context::new())?,
            };
            slicer = match tuples.as_slice() {
                [tuple] => slicer.with_tuple(tuple),
                _ => slicer.with_compound(TupleList::new(tuples.clone())),
            };
            slicer_tuples = tuples;
        }
        let slicer_hierarchies = slicer_tuples
            .first()
            .map(|t| t.iter().map(|m| m.hierarchy()).collect())
            .unwrap_or_default();

        let mut axes = Vec::with_capacity(select.axes.len());
        for axis in &select.axes {
            axes.push(ev.eval_set(&axis.expr, &slicer)?);
        }
        Ok(Self {
            slicer,
            slicer_hierarchies,
            slicer_tuples,
            axes,
        })
    }

    /// Context of the cell at `coordinates`.
    pub fn context(&self, coordinates: &[usize]) -> Context {
        let mut ctx = self.slicer.clone();
        for (axis, position) in self.axes.iter().zip(coordinates) {
            ctx = ctx.with_tuple(&axis[*position]);
        }
        ctx
    }

    /// Hierarchies of a cell in drill-through column order: rows, then
    /// higher axes, then columns, then the slicer.
    pub fn column_order(&self, coordinates: &[usize]) -> Vec<HierarchyId> {
        let mut axis_order: Vec<usize> = (1..self.axes.len()).collect();
        if !self.axes.is_empty() {
            axis_order.push(0);
        }
        let mut order: Vec<HierarchyId> = Vec::new();
        let axis_hierarchies = axis_order.into_iter().flat_map(|a| {
            self.axes[a][coordinates[a]].iter().map(|m| m.hierarchy())
        });
        for h in axis_hierarchies.chain(self.slicer_hierarchies.iter().copied()) {
            if !order.contains(&h) {
                order.push(h);
            }
        }
        order
    }
}

#[derive(Debug, Clone)]
struct CellData {
    coordinates: Vec<usize>,
    value: CellValue,
    formatted: String,
    ctx: Context,
    order: Vec<HierarchyId>,
}

/// The axes and cells of one `SELECT`. Cells are stored with the first
/// axis varying fastest.
pub struct QueryResult {
    state: Arc<QueryState>,
    slicer: Vec<Position>,
    axes: Vec<AxisResult>,
    cells: Vec<CellData>,
}

impl QueryResult {
    pub(crate) fn evaluate(state: Arc<QueryState>, select: &SelectStatement) -> OlapResult<Self> {
        let ev = Evaluator::new(&state);
        let layout = Layout::evaluate(&ev, select)?;
        let shape: Vec<usize> = layout.axes.iter().map(Vec::len).collect();
        let total: usize = shape.iter().product();

        let mut cells = Vec::with_capacity(total);
        for flat in 0..total {
            let mut coordinates = Vec::with_capacity(shape.len());
            let mut rest = flat;
            for len in &shape {
                coordinates.push(rest % len);
                rest /= len;
            }
            let ctx = layout.context(&coordinates);
            let value = ev.cell_value(&ctx)?;
            let formatted = format_cell(&ev, &ctx, &value)?;
            cells.push(CellData {
                order: layout.column_order(&coordinates),
                coordinates,
                value,
                formatted,
                ctx,
            });
        }

        // NON EMPTY: drop positions whose cells are all empty.
        let keep: Vec<Vec<bool>> = select
            .axes
            .iter()
            .zip(&shape)
            .enumerate()
            .map(|(a, (axis, len))| {
                if !axis.non_empty {
                    return vec![true; *len];
                }
                let mut keep = vec![false; *len];
                for cell in cells.iter().filter(|c| !c.value.is_empty()) {
                    keep[cell.coordinates[a]] = true;
                }
                keep
            })
            .collect();
        let renumber: Vec<Vec<Option<usize>>> = keep
            .iter()
            .map(|k| {
                let mut next = 0;
                k.iter()
                    .map(|kept| {
                        kept.then(|| {
                            next += 1;
                            next - 1
                        })
                    })
                    .collect()
            })
            .collect();
        let cells: Vec<CellData> = cells
            .into_iter()
            .filter_map(|mut cell| {
                let coordinates = cell
                    .coordinates
                    .iter()
                    .enumerate()
                    .map(|(a, i)| renumber[a][*i])
                    .collect::<Option<Vec<_>>>()?;
                cell.coordinates = coordinates;
                Some(cell)
            })
            .collect();

        let mut axes = Vec::with_capacity(layout.axes.len());
        for (tuples, keep) in layout.axes.iter().zip(&keep) {
            let mut positions = Vec::new();
            for (tuple, kept) in tuples.iter().zip(keep) {
                if *kept {
                    positions.push(position(&ev, tuple)?);
                }
            }
            axes.push(AxisResult { positions });
        }
        let slicer = layout
            .slicer_tuples
            .iter()
            .map(|t| position(&ev, t))
            .collect::<EvalResult<Vec<_>>>()?;
        debug!(cube = %state.cube().name, cells = cells.len(), "query evaluated");

        Ok(Self {
            state,
            slicer,
            axes,
            cells,
        })
    }

    pub fn axes(&self) -> &[AxisResult] {
        &self.axes
    }

    /// Slicer tuples; empty without a `WHERE` clause.
    pub fn slicer(&self) -> &[Position] {
        &self.slicer
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// The cell at `coordinates`, one position per axis.
    ///
    /// # Panics
    ///
    /// If a coordinate is out of range for its axis.
    pub fn cell(&self, coordinates: &[usize]) -> Cell<'_> {
        assert_eq!(
            coordinates.len(),
            self.axes.len(),
            "one coordinate per axis"
        );
        let mut flat = 0;
        let mut stride = 1;
        for (axis, i) in self.axes.iter().zip(coordinates) {
            assert!(*i < axis.positions.len(), "coordinate {i} out of range");
            flat += i * stride;
            stride *= axis.positions.len();
        }
        Cell {
            result: self,
            data: &self.cells[flat],
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell<'_>> {
        self.cells.iter().map(move |data| Cell { result: self, data })
    }
}

fn position(ev: &Evaluator<'_>, tuple: &Tuple) -> EvalResult<Position> {
    let mut unique_names = Vec::with_capacity(tuple.len());
    let mut captions = Vec::with_capacity(tuple.len());
    for member in tuple {
        unique_names.push(ev.unique_name(*member)?);
        captions.push(ev.name(*member)?);
    }
    Ok(Position {
        tuple: tuple.clone(),
        unique_names,
        captions,
    })
}

fn format_cell(ev: &Evaluator<'_>, ctx: &Context, value: &CellValue) -> EvalResult<String> {
    let format = ev.cell_format(ctx)?;
    let formatter = format
        .formatter
        .as_deref()
        .and_then(|name| ev.q.shared.formatters.get(name));
    Ok(match formatter {
        Some(f) => apply_formatter(f.as_ref(), value),
        None => format_value(value, format.format_string.as_deref()),
    })
}

/// A cell of a [`QueryResult`].
#[derive(Clone, Copy)]
pub struct Cell<'r> {
    result: &'r QueryResult,
    data: &'r CellData,
}

impl fmt::Debug for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("coordinates", &self.data.coordinates)
            .field("value", &self.data.value)
            .field("formatted_value", &self.data.formatted)
            .finish()
    }
}

impl<'r> Cell<'r> {
    pub fn coordinates(&self) -> &'r [usize] {
        &self.data.coordinates
    }

    pub fn value(&self) -> &'r CellValue {
        &self.data.value
    }

    pub fn formatted_value(&self) -> &'r str {
        &self.data.formatted
    }

    pub fn is_error(&self) -> bool {
        matches!(self.data.value, CellValue::Error(_))
    }

    /// Whether the cell's fact rows can be reconstructed with one query.
    pub fn can_drill_through(&self) -> bool {
        self.result.state.shared.settings.drillthrough.enabled
            && drillthrough::is_drillable(&self.result.state, &self.data.ctx)
    }

    /// SQL returning the fact rows behind the cell, `None` if the cell is
    /// not drillable. With `extended_context` every other level of the
    /// base cube is added as a column.
    pub fn drill_through_sql(&self, extended_context: bool) -> OlapResult<Option<String>> {
        drillthrough::cell_sql(
            &self.result.state,
            &self.data.ctx,
            &self.data.order,
            extended_context,
        )
    }

    /// Number of fact rows behind the cell.
    pub fn drill_through_count(&self) -> OlapResult<Option<u64>> {
        drillthrough::cell_count(&self.result.state, &self.data.ctx, &self.data.order)
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_tuple(f: &mut fmt::Formatter<'_>, names: &[String]) -> fmt::Result {
            writeln!(f, "{{{}}}", names.join(", "))
        }

        writeln!(f, "Axis #0:")?;
        if self.slicer.is_empty() {
            writeln!(f, "{{}}")?;
        }
        for position in &self.slicer {
            write_tuple(f, &position.unique_names)?;
        }
        for (i, axis) in self.axes.iter().enumerate() {
            writeln!(f, "Axis #{}:", i + 1)?;
            for position in &axis.positions {
                write_tuple(f, &position.unique_names)?;
            }
        }
        let columns = self.axes.first().map(|a| a.positions.len()).unwrap_or(1).max(1);
        for (i, cell) in self.cells.iter().enumerate() {
            writeln!(f, "Row #{}: {}", i / columns, cell.formatted)?;
        }
        Ok(())
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

