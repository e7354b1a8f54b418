//! Name resolution: identifiers to members, levels, hierarchies and named
//! sets of the query's cube.
//!
//! Member names match case-insensitively after an exact match has been
//! tried. A `&[key]` segment matches member keys and must give one value
//! per key column of its level.

use tracing::warn;

use super::context::Context;
use super::eval::{Datum, Evaluator};
use super::member::{MemberRef, Tuple};
use super::{EvalError, EvalResult};
use crate::mdx::{Identifier, MdxError, Segment};
use crate::schema::deps::quoted;
use crate::schema::{HierarchyId, MEASURES_HIERARCHY};

enum Resolved {
    Found(Datum),
    /// Not found; the hierarchy the name points into, if known.
    Missing(Option<HierarchyId>),
}

use Resolved::{Found, Missing};

impl<'q> Evaluator<'q> {
    /// Resolve an identifier. With `query.ignore_invalid_members`, a
    /// missing member of a known hierarchy becomes a null member.
    pub fn resolve(&self, id: &Identifier) -> EvalResult<Datum> {
        match self.lookup(id)? {
            Found(datum) => Ok(datum),
            Missing(Some(h)) if self.q.shared.settings.query.ignore_invalid_members => {
                warn!(member = %quoted(id), "ignoring invalid member");
                Ok(Datum::Member(MemberRef::Null(h)))
            }
            Missing(_) => Err(self.not_found(quoted(id))),
        }
    }

    /// Hierarchy, parent and name of a `WITH MEMBER` definition.
    pub fn calc_target(
        &self,
        name: &Identifier,
    ) -> EvalResult<(HierarchyId, Option<MemberRef>, String)> {
        let member_name = name
            .last_name()
            .ok_or_else(|| self.not_found(quoted(name)))?
            .to_string();
        if name.segments.len() == 1 {
            return Ok((MEASURES_HIERARCHY, None, member_name));
        }
        let prefix = Identifier {
            segments: name.segments[..name.segments.len() - 1].to_vec(),
            pos: name.pos,
        };
        match self.lookup(&prefix)? {
            Found(Datum::Hierarchy(h)) => Ok((h, None, member_name)),
            Found(Datum::Member(m @ MemberRef::Stored { hierarchy, index })) => {
                let is_all = self.q.members(hierarchy)?.member(index).is_all();
                Ok((hierarchy, (!is_all).then_some(m), member_name))
            }
            Found(Datum::Member(m)) => Ok((m.hierarchy(), None, member_name)),
            _ => Err(self.not_found(quoted(&prefix))),
        }
    }

    fn lookup(&self, id: &Identifier) -> EvalResult<Resolved> {
        let Some(first) = id.segments.first().and_then(Segment::as_name) else {
            return Ok(Missing(None));
        };
        if id.segments.len() == 1 {
            return self.lookup_single(first);
        }
        let schema = self.schema();
        let cube = self.cube();
        let rest = &id.segments[1..];

        // `[Time.Weekly].[1997]`
        if first.contains('.') {
            if let Some(h) = self.hierarchy_by_unique_name(&format!("[{first}]")) {
                return self.lookup_in(h, rest, id);
            }
        }
        let Some(dimension) = schema.cube_dimension(cube, first) else {
            return Ok(Missing(None));
        };
        if let [h] = dimension.hierarchies.as_slice() {
            return self.lookup_in(*h, rest, id);
        }
        // `[Time].[Weekly].[1997]`
        if let Some(name) = rest[0].as_name() {
            if let Some(h) = dimension
                .hierarchies
                .iter()
                .find(|h| schema.hierarchy(**h).name.eq_ignore_ascii_case(name))
            {
                return self.lookup_in(*h, &rest[1..], id);
            }
        }

        let mut found = Vec::new();
        for h in &dimension.hierarchies {
            if let Found(datum) = self.lookup_in(*h, rest, id)? {
                found.push(datum);
            }
        }
        match found.len() {
            0 => Ok(Missing(dimension.hierarchies.first().copied())),
            1 => Ok(Found(found.remove(0))),
            _ => Err(EvalError::Mdx(MdxError::AmbiguousHierarchy {
                name: dimension.name.clone(),
                line: id.pos.line,
                column: id.pos.column,
            })),
        }
    }

    fn hierarchy_by_unique_name(&self, unique_name: &str) -> Option<HierarchyId> {
        let schema = self.schema();
        schema
            .cube_hierarchies(self.cube())
            .into_iter()
            .find(|h| schema.hierarchy(*h).unique_name.eq_ignore_ascii_case(unique_name))
    }

    /// A name without dots: named set, dimension, measure, calculated
    /// member or top-level member, in that order.
    fn lookup_single(&self, name: &str) -> EvalResult<Resolved> {
        let schema = self.schema();
        let cube = self.cube();
        if let Some(tuples) = self.named_set(name)? {
            return Ok(Found(Datum::Set(tuples)));
        }
        if let Some(dimension) = schema.cube_dimension(cube, name) {
            if let Some(h) = dimension.hierarchies.first() {
                return Ok(Found(Datum::Hierarchy(*h)));
            }
        }
        if let Some(h) = self.hierarchy_by_unique_name(&format!("[{name}]")) {
            return Ok(Found(Datum::Hierarchy(h)));
        }
        if let Some(i) = cube.measure(name) {
            return Ok(Found(Datum::Member(MemberRef::Measure(i))));
        }
        if let Some((index, calc)) = self
            .q
            .calcs
            .iter()
            .enumerate()
            .find(|(_, c)| c.parent.is_none() && c.name.eq_ignore_ascii_case(name))
        {
            return Ok(Found(Datum::Member(MemberRef::Calculated {
                hierarchy: calc.hierarchy,
                index,
            })));
        }
        for h in schema.cube_hierarchies(cube).into_iter().skip(1) {
            let members = self.q.members(h)?;
            let all = members
                .all()
                .filter(|a| members.member(*a).name.eq_ignore_ascii_case(name));
            if let Some(index) = all.or_else(|| members.child_by_name(None, name)) {
                return Ok(Found(Datum::Member(MemberRef::stored(h, index))));
            }
        }
        Ok(Missing(None))
    }

    fn named_set(&self, name: &str) -> EvalResult<Option<Vec<Tuple>>> {
        let key = name.to_lowercase();
        let cached = self.named_sets.borrow().get(&key).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let Some((_, expr)) = self
            .q
            .sets
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        let tuples = self.eval_set(expr, &Context::new())?;
        self.named_sets.borrow_mut().insert(key, tuples.clone());
        Ok(Some(tuples))
    }

    /// Segments below a hierarchy: a level, a calculated member or a path
    /// of member names and keys.
    fn lookup_in(&self, h: HierarchyId, rest: &[Segment], id: &Identifier) -> EvalResult<Resolved> {
        if rest.is_empty() {
            return Ok(Found(Datum::Hierarchy(h)));
        }
        let cube = self.cube();
        let hierarchy = self.schema().hierarchy(h);
        let calc_named = |parent: Option<MemberRef>, name: &str| {
            self.q.calcs.iter().position(|c| {
                c.hierarchy == h && c.parent == parent && c.name.eq_ignore_ascii_case(name)
            })
        };

        if h == MEASURES_HIERARCHY {
            let [Segment::Name { text, .. }] = rest else {
                return Ok(Missing(Some(h)));
            };
            if let Some(i) = cube.measure(text) {
                return Ok(Found(Datum::Member(MemberRef::Measure(i))));
            }
            return Ok(match calc_named(None, text) {
                Some(index) => Found(Datum::Member(MemberRef::Calculated { hierarchy: h, index })),
                None => Missing(Some(h)),
            });
        }

        if let [Segment::Name { text, .. }] = rest {
            if let Some(level) = hierarchy.level_by_name(text) {
                return Ok(Found(Datum::Level(h, level)));
            }
            if let Some(index) = calc_named(None, text) {
                return Ok(Found(Datum::Member(MemberRef::Calculated { hierarchy: h, index })));
            }
        }

        let members = self.q.members(h)?;
        let parent_child = hierarchy.parent_child_level();
        let mut current: Option<usize> = None;
        for (i, segment) in rest.iter().enumerate() {
            // The all member is the parent of the top level, not a member
            // of it.
            let parent = current.filter(|c| Some(*c) != members.all());
            let next = match segment {
                Segment::Name { text, .. } => {
                    if i == 0 && members.all().is_some() && hierarchy.all_member_name.eq_ignore_ascii_case(text) {
                        current = members.all();
                        continue;
                    }
                    members.child_by_name(parent, text)
                }
                Segment::Key(values) => {
                    let level_index = match parent_child {
                        Some((level, _)) => level,
                        None => parent
                            .and_then(|p| members.member(p).level)
                            .map(|l| l + 1)
                            .unwrap_or(0),
                    };
                    let Some(level) = hierarchy.levels.get(level_index) else {
                        return Ok(Missing(Some(h)));
                    };
                    if values.len() != level.key_columns.len() {
                        return Err(EvalError::KeyArity {
                            member: quoted(id),
                            expected: level.key_columns.len(),
                            got: values.len(),
                        });
                    }
                    match (parent_child, parent) {
                        (Some(_), None) => members.find_by_key(values),
                        _ => members.child_by_key(parent, values),
                    }
                }
            };
            match next {
                Some(index) => current = Some(index),
                None => {
                    let last = i + 1 == rest.len();
                    let calc = segment
                        .as_name()
                        .filter(|_| last)
                        .and_then(|name| calc_named(parent.map(|p| MemberRef::stored(h, p)), name));
                    return Ok(match calc {
                        Some(index) => {
                            Found(Datum::Member(MemberRef::Calculated { hierarchy: h, index }))
                        }
                        None => Missing(Some(h)),
                    });
                }
            }
        }
        Ok(match current {
            Some(index) => Found(Datum::Member(MemberRef::stored(h, index))),
            None => Missing(Some(h)),
        })
    }
}
