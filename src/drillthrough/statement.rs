//! `DRILLTHROUGH [MAXROWS n] [FIRSTROWSET m] SELECT ... [RETURN ...]`.

use std::sync::Arc;

use tracing::debug;

use super::sql::{build, target, ReturnField};
use super::{DrillThroughError, DrillThroughResult};
use crate::mdx::{DrillThroughStatement, Identifier};
use crate::olap::eval::{Datum, Evaluator, QueryState};
use crate::olap::member::MemberRef;
use crate::olap::result::Layout;
use crate::olap::session::Shared;
use crate::olap::OlapResult;

fn return_field(ev: &Evaluator<'_>, id: &Identifier) -> OlapResult<ReturnField> {
    match ev.resolve(id)? {
        Datum::Level(h, l) => Ok(ReturnField::Level(h, l)),
        Datum::Member(MemberRef::Measure(i)) => Ok(ReturnField::Measure(i)),
        Datum::Member(MemberRef::Calculated { index, .. }) => Err(
            DrillThroughError::CalculatedMemberInReturn(ev.q.calcs[index].unique_name.clone())
                .into(),
        ),
        _ => Err(DrillThroughError::InvalidReturn(id.to_string()).into()),
    }
}

/// Run a drill-through statement on the first cell of its `SELECT`.
pub(crate) fn execute(
    shared: Arc<Shared>,
    statement: &DrillThroughStatement,
) -> OlapResult<DrillThroughResult> {
    if !shared.settings.drillthrough.enabled {
        return Err(DrillThroughError::Disabled.into());
    }
    let select = &statement.select;
    let state = QueryState::new(shared.clone(), &select.cube, &select.with)?;
    let ev = Evaluator::new(&state);
    let layout = Layout::evaluate(&ev, select)?;
    if layout.axes.iter().any(Vec::is_empty) {
        return Err(DrillThroughError::NotDrillable("a query without cells".into()).into());
    }

    let coordinates = vec![0; layout.axes.len()];
    let ctx = layout.context(&coordinates);
    let Some(target) = target(&ev, &ctx)? else {
        let mut names = Vec::new();
        for member in ctx.members() {
            names.push(ev.unique_name(member)?);
        }
        return Err(DrillThroughError::NotDrillable(format!("cell ({})", names.join(", "))).into());
    };
    let returns = statement
        .returns
        .iter()
        .map(|id| return_field(&ev, id))
        .collect::<OlapResult<Vec<_>>>()?;
    let query = build(
        &ev,
        &ctx,
        &target,
        &layout.column_order(&coordinates),
        false,
        (!returns.is_empty()).then_some(returns.as_slice()),
    )?;

    let max_rows = statement
        .max_rows
        .unwrap_or(shared.settings.drillthrough.max_rows);
    let skip = statement.first_row_set.unwrap_or(1).max(1) - 1;
    let result = shared
        .connection
        .execute_query(&query.sql, Some(skip.saturating_add(max_rows)))?;
    let rows: Vec<_> = result.rows.into_iter().skip(skip).take(max_rows).collect();
    debug!(rows = rows.len(), skip, max_rows, "drill-through rows");

    Ok(DrillThroughResult {
        columns: query.columns,
        rows,
        sql: query.sql,
    })
}
