//! Expression evaluation: placeholder resolution, path navigation, and the
//! three-valued (Kleene) logic used for filter/condition expressions (§4.3).
//!
//! Evaluation never mutates its inputs except through [`apply_update`], which
//! is the only function that writes into an [`Item`]. Everything else reads.

use std::collections::BTreeMap;

use docstore_codec::collation::collation_string;
use docstore_core::{decimal_add, decimal_sub, AttributeValue, Item};

use crate::ast::*;
use crate::error::{ExprError, Result};

/// The two maps every expression evaluation is resolved against.
pub struct ExprContext<'a> {
    pub names: &'a BTreeMap<String, String>,
    pub values: &'a BTreeMap<String, AttributeValue>,
}

impl<'a> ExprContext<'a> {
    pub fn empty() -> ExprContext<'static> {
        // A 'static empty context for callers with no placeholders at all.
        static EMPTY_NAMES: std::sync::OnceLock<BTreeMap<String, String>> = std::sync::OnceLock::new();
        static EMPTY_VALUES: std::sync::OnceLock<BTreeMap<String, AttributeValue>> = std::sync::OnceLock::new();
        ExprContext {
            names: EMPTY_NAMES.get_or_init(BTreeMap::new),
            values: EMPTY_VALUES.get_or_init(BTreeMap::new),
        }
    }

    fn resolve_name(&self, name: &NameRef) -> Result<String> {
        match name {
            NameRef::Literal(s) => Ok(s.clone()),
            NameRef::Placeholder(p) => self
                .names
                .get(p)
                .cloned()
                .ok_or_else(|| ExprError::UnknownNamePlaceholder(p.clone())),
        }
    }

    fn resolve_value(&self, placeholder: &str) -> Result<&AttributeValue> {
        self.values
            .get(placeholder)
            .ok_or_else(|| ExprError::UnknownValuePlaceholder(placeholder.to_string()))
    }

    fn resolve_path(&self, path: &Path) -> Result<Vec<ResolvedSegment>> {
        path.0
            .iter()
            .map(|seg| match seg {
                PathSegment::Attr(n) => Ok(ResolvedSegment::Attr(self.resolve_name(n)?)),
                PathSegment::Index(i) => Ok(ResolvedSegment::Index(*i)),
            })
            .collect()
    }
}

enum ResolvedSegment {
    Attr(String),
    Index(usize),
}

/// Three-valued logic result for condition evaluation (§4.3): a missing
/// operand makes a comparison `Unknown` rather than `false`, and `Unknown`
/// propagates through `AND`/`OR`/`NOT` per Kleene's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate {
    True,
    False,
    Unknown,
}

impl Tristate {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Tristate::True
        } else {
            Tristate::False
        }
    }

    /// Collapses `Unknown` to `false`, the rule used when a filter/condition
    /// expression's overall result gates an operation (§4.3: a top-level
    /// `Unknown` behaves as `false`).
    pub fn as_bool(self) -> bool {
        matches!(self, Tristate::True)
    }

    fn not(self) -> Self {
        match self {
            Tristate::True => Tristate::False,
            Tristate::False => Tristate::True,
            Tristate::Unknown => Tristate::Unknown,
        }
    }

    fn and(self, other: Self) -> Self {
        use Tristate::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    fn or(self, other: Self) -> Self {
        use Tristate::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }
}

// -- Path navigation ----------------------------------------------------------

fn get_nested<'v>(value: &'v AttributeValue, segs: &[ResolvedSegment]) -> Option<&'v AttributeValue> {
    let Some((head, rest)) = segs.split_first() else {
        return Some(value);
    };
    let next = match (value, head) {
        (AttributeValue::M(map), ResolvedSegment::Attr(name)) => map.get(name)?,
        (AttributeValue::L(list), ResolvedSegment::Index(idx)) => list.get(*idx)?,
        _ => return None,
    };
    get_nested(next, rest)
}

/// Reads the value at `path` within `item`, or `None` if any segment is
/// absent or type-mismatched (absence, never an error -- §4.3).
pub fn get_path<'i>(item: &'i Item, path: &Path, ctx: &ExprContext) -> Result<Option<&'i AttributeValue>> {
    let segs = ctx.resolve_path(path)?;
    let Some((head, rest)) = segs.split_first() else {
        return Ok(None);
    };
    let ResolvedSegment::Attr(root) = head else {
        return Err(ExprError::Validation("a path must begin with an attribute name".into()));
    };
    Ok(item.get(root).and_then(|v| get_nested(v, rest)))
}

fn get_nested_mut<'v>(value: &'v mut AttributeValue, segs: &[ResolvedSegment]) -> Option<&'v mut AttributeValue> {
    let Some((head, rest)) = segs.split_first() else {
        return Some(value);
    };
    let next = match (value, head) {
        (AttributeValue::M(map), ResolvedSegment::Attr(name)) => map.get_mut(name)?,
        (AttributeValue::L(list), ResolvedSegment::Index(idx)) => list.get_mut(*idx)?,
        _ => return None,
    };
    get_nested_mut(next, rest)
}

/// Writes `value` at `path`, creating the leaf (or appending to a list, or
/// growing an existing map) but never materializing missing intermediate
/// containers -- matching the managed store's own "document path must be
/// valid" update rule.
fn set_path(item: &mut Item, segs: &[ResolvedSegment], value: AttributeValue) -> Result<()> {
    let Some((head, rest)) = segs.split_first() else {
        return Err(ExprError::Validation("empty path".into()));
    };
    let ResolvedSegment::Attr(root) = head else {
        return Err(ExprError::Validation("a path must begin with an attribute name".into()));
    };
    if rest.is_empty() {
        item.insert(root.clone(), value);
        return Ok(());
    }
    let existing = item
        .get(root)
        .cloned()
        .ok_or_else(|| ExprError::Validation(format!("document path not valid for update: {root}")))?;
    let mut root_value = existing;
    write_nested(&mut root_value, rest, value)?;
    item.insert(root.clone(), root_value);
    Ok(())
}

fn write_nested(value: &mut AttributeValue, segs: &[ResolvedSegment], new_value: AttributeValue) -> Result<()> {
    let Some((head, rest)) = segs.split_first() else {
        *value = new_value;
        return Ok(());
    };
    match (value, head) {
        (AttributeValue::M(map), ResolvedSegment::Attr(name)) => {
            if rest.is_empty() {
                map.insert(name.clone(), new_value);
                Ok(())
            } else {
                let child = map
                    .get_mut(name)
                    .ok_or_else(|| ExprError::Validation(format!("document path not valid for update: {name}")))?;
                write_nested(child, rest, new_value)
            }
        }
        (AttributeValue::L(list), ResolvedSegment::Index(idx)) => {
            if rest.is_empty() {
                if *idx == list.len() {
                    list.push(new_value);
                } else if *idx < list.len() {
                    list[*idx] = new_value;
                } else {
                    return Err(ExprError::Validation("list index out of range for update".into()));
                }
                Ok(())
            } else {
                let child = list
                    .get_mut(*idx)
                    .ok_or_else(|| ExprError::Validation("list index out of range for update".into()))?;
                write_nested(child, rest, new_value)
            }
        }
        _ => Err(ExprError::Validation("document path not valid for update".into())),
    }
}

fn remove_path(item: &mut Item, segs: &[ResolvedSegment]) -> Result<()> {
    let Some((head, rest)) = segs.split_first() else {
        return Err(ExprError::Validation("empty path".into()));
    };
    let ResolvedSegment::Attr(root) = head else {
        return Err(ExprError::Validation("a path must begin with an attribute name".into()));
    };
    if rest.is_empty() {
        item.remove(root);
        return Ok(());
    }
    let Some(mut root_value) = item.get(root).cloned() else {
        return Ok(());
    };
    remove_nested(&mut root_value, rest);
    item.insert(root.clone(), root_value);
    Ok(())
}

fn remove_nested(value: &mut AttributeValue, segs: &[ResolvedSegment]) {
    let Some((head, rest)) = segs.split_first() else {
        return;
    };
    match (value, head) {
        (AttributeValue::M(map), ResolvedSegment::Attr(name)) => {
            if rest.is_empty() {
                map.remove(name);
            } else if let Some(child) = map.get_mut(name) {
                remove_nested(child, rest);
            }
        }
        (AttributeValue::L(list), ResolvedSegment::Index(idx)) => {
            if rest.is_empty() {
                if *idx < list.len() {
                    list.remove(*idx);
                }
            } else if let Some(child) = list.get_mut(*idx) {
                remove_nested(child, rest);
            }
        }
        _ => {}
    }
}

// -- Operand evaluation -------------------------------------------------------

fn eval_operand(item: &Item, operand: &Operand, ctx: &ExprContext) -> Result<Option<AttributeValue>> {
    match operand {
        Operand::Path(p) => Ok(get_path(item, p, ctx)?.cloned()),
        Operand::Value(placeholder) => Ok(Some(ctx.resolve_value(placeholder)?.clone())),
        Operand::Size(p) => Ok(get_path(item, p, ctx)?
            .and_then(|v| v.size())
            .map(|n| AttributeValue::N(n.to_string()))),
        Operand::IfNotExists(path, default) => match get_path(item, path, ctx)? {
            Some(v) => Ok(Some(v.clone())),
            None => eval_operand(item, default, ctx),
        },
        Operand::ListAppend(a, b) => {
            let a = eval_operand(item, a, ctx)?;
            let b = eval_operand(item, b, ctx)?;
            match (a, b) {
                (Some(AttributeValue::L(mut av)), Some(AttributeValue::L(bv))) => {
                    av.extend(bv);
                    Ok(Some(AttributeValue::L(av)))
                }
                _ => Err(ExprError::Validation("list_append requires two list operands".into())),
            }
        }
        Operand::Arithmetic(a, op, b) => {
            let a = eval_operand(item, a, ctx)?;
            let b = eval_operand(item, b, ctx)?;
            match (a, b) {
                (Some(AttributeValue::N(av)), Some(AttributeValue::N(bv))) => {
                    let result = apply_arith(&av, &bv, *op)?;
                    Ok(Some(AttributeValue::N(result)))
                }
                _ => Err(ExprError::Validation("arithmetic requires two numeric operands".into())),
            }
        }
    }
}

fn apply_arith(a: &str, b: &str, op: ArithOp) -> Result<String> {
    let result = match op {
        ArithOp::Add => decimal_add(a, b),
        ArithOp::Sub => decimal_sub(a, b),
    };
    result.ok_or_else(|| ExprError::Validation(format!("not a number: {a} or {b}")))
}

// -- Condition evaluation -----------------------------------------------------

fn compare(op: CmpOp, a: &AttributeValue, b: &AttributeValue) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => ordered_cmp(a, b) == Some(std::cmp::Ordering::Less),
        CmpOp::Le => matches!(ordered_cmp(a, b), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CmpOp::Gt => ordered_cmp(a, b) == Some(std::cmp::Ordering::Greater),
        CmpOp::Ge => matches!(ordered_cmp(a, b), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
    }
}

fn ordered_cmp(a: &AttributeValue, b: &AttributeValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            let xc = collation_string(a).ok()?;
            let yc = collation_string(b).ok()?;
            Some(xc.cmp(&yc))
        }
        (AttributeValue::S(x), AttributeValue::S(y)) => Some(x.cmp(y)),
        (AttributeValue::B(x), AttributeValue::B(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Evaluates a condition expression against an item, per the three-valued
/// logic in §4.3. A comparison whose operand is absent from the item (and
/// not produced by a function) is `Unknown`, not `false`.
pub fn eval_condition(item: &Item, cond: &Cond, ctx: &ExprContext) -> Result<Tristate> {
    match cond {
        Cond::Compare(a, op, b) => {
            let (a, b) = (eval_operand(item, a, ctx)?, eval_operand(item, b, ctx)?);
            match (a, b) {
                (Some(a), Some(b)) => Ok(Tristate::from_bool(compare(*op, &a, &b))),
                _ => Ok(Tristate::Unknown),
            }
        }
        Cond::Between(v, lo, hi) => {
            let (v, lo, hi) = (eval_operand(item, v, ctx)?, eval_operand(item, lo, ctx)?, eval_operand(item, hi, ctx)?);
            match (v, lo, hi) {
                (Some(v), Some(lo), Some(hi)) => {
                    Ok(Tristate::from_bool(compare(CmpOp::Ge, &v, &lo) && compare(CmpOp::Le, &v, &hi)))
                }
                _ => Ok(Tristate::Unknown),
            }
        }
        Cond::BeginsWith(a, b) => {
            let (a, b) = (eval_operand(item, a, ctx)?, eval_operand(item, b, ctx)?);
            match (a, b) {
                (Some(AttributeValue::S(a)), Some(AttributeValue::S(b))) => Ok(Tristate::from_bool(a.starts_with(&b))),
                (Some(_), Some(_)) => Ok(Tristate::False),
                _ => Ok(Tristate::Unknown),
            }
        }
        Cond::In(v, candidates) => {
            let Some(v) = eval_operand(item, v, ctx)? else {
                return Ok(Tristate::Unknown);
            };
            for c in candidates {
                if let Some(c) = eval_operand(item, c, ctx)? {
                    if c == v {
                        return Ok(Tristate::True);
                    }
                }
            }
            Ok(Tristate::False)
        }
        Cond::AttributeExists(path) => Ok(Tristate::from_bool(get_path(item, path, ctx)?.is_some())),
        Cond::AttributeNotExists(path) => Ok(Tristate::from_bool(get_path(item, path, ctx)?.is_none())),
        Cond::AttributeType(path, ty) => {
            let Some(actual) = get_path(item, path, ctx)? else {
                return Ok(Tristate::Unknown);
            };
            let Some(AttributeValue::S(expected)) = eval_operand(item, ty, ctx)? else {
                return Err(ExprError::Validation("attribute_type requires a string type tag".into()));
            };
            Ok(Tristate::from_bool(actual.type_tag() == expected))
        }
        Cond::Contains(a, b) => {
            let (a, b) = (eval_operand(item, a, ctx)?, eval_operand(item, b, ctx)?);
            match (a, b) {
                (Some(a), Some(b)) => Ok(Tristate::from_bool(a.contains(&b))),
                _ => Ok(Tristate::Unknown),
            }
        }
        Cond::Not(inner) => Ok(eval_condition(item, inner, ctx)?.not()),
        Cond::And(a, b) => {
            let a = eval_condition(item, a, ctx)?;
            let b = eval_condition(item, b, ctx)?;
            Ok(a.and(b))
        }
        Cond::Or(a, b) => {
            let a = eval_condition(item, a, ctx)?;
            let b = eval_condition(item, b, ctx)?;
            Ok(a.or(b))
        }
    }
}

/// Evaluates a key condition against an item's actual key, used by `Query`
/// to restrict a partition's sort-key range (§4.3). This is always crisp
/// (never `Unknown`): a missing sort key on the item means no match.
pub fn eval_key_condition(
    partition: &AttributeValue,
    sort: Option<&AttributeValue>,
    kc: &KeyCondition,
    ctx: &ExprContext,
) -> Result<bool> {
    let pk_value = ctx.resolve_value(&kc.partition_value)?;
    if partition != pk_value {
        return Ok(false);
    }
    let Some(sort_cond) = &kc.sort else {
        return Ok(true);
    };
    let Some(sort) = sort else {
        return Ok(false);
    };
    Ok(match sort_cond {
        SortKeyCondition::Compare(_, op, v) => compare(*op, sort, ctx.resolve_value(v)?),
        SortKeyCondition::Between(_, lo, hi) => {
            compare(CmpOp::Ge, sort, ctx.resolve_value(lo)?) && compare(CmpOp::Le, sort, ctx.resolve_value(hi)?)
        }
        SortKeyCondition::BeginsWith(_, v) => match (sort, ctx.resolve_value(v)?) {
            (AttributeValue::S(s), AttributeValue::S(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
    })
}

// -- Update application --------------------------------------------------------

/// Applies an update expression to `item` in place (§4.4). `ADD`/`DELETE` on
/// a numeric or set attribute create it if absent; `SET`/`REMOVE` follow the
/// document-path rules in [`set_path`]/[`remove_path`].
pub fn apply_update(item: &mut Item, update: &UpdateExpr, ctx: &ExprContext) -> Result<()> {
    for action in &update.set {
        let value = eval_operand(item, &action.value, ctx)?
            .ok_or_else(|| ExprError::Validation("SET value resolved to nothing".into()))?;
        let segs = ctx.resolve_path(&action.target)?;
        set_path(item, &segs, value)?;
    }

    for action in &update.add {
        let segs = ctx.resolve_path(&action.target)?;
        let delta = eval_operand(item, &action.value, ctx)?
            .ok_or_else(|| ExprError::Validation("ADD value resolved to nothing".into()))?;
        let current = get_path(item, &action.target, ctx)?.cloned();
        let new_value = match (current, delta) {
            (None, AttributeValue::N(d)) => AttributeValue::N(d),
            (Some(AttributeValue::N(c)), AttributeValue::N(d)) => AttributeValue::N(apply_arith(&c, &d, ArithOp::Add)?),
            (None, AttributeValue::SS(d)) => AttributeValue::SS(d),
            (Some(AttributeValue::SS(mut c)), AttributeValue::SS(d)) => {
                c.extend(d);
                AttributeValue::SS(c)
            }
            (None, AttributeValue::NS(d)) => AttributeValue::NS(d),
            (Some(AttributeValue::NS(mut c)), AttributeValue::NS(d)) => {
                c.extend(d);
                AttributeValue::NS(c)
            }
            (None, AttributeValue::BS(d)) => AttributeValue::BS(d),
            (Some(AttributeValue::BS(mut c)), AttributeValue::BS(d)) => {
                c.extend(d);
                AttributeValue::BS(c)
            }
            _ => return Err(ExprError::Validation("ADD requires a number or set, with matching existing type".into())),
        };
        set_path(item, &segs, new_value)?;
    }

    for action in &update.delete {
        let current = get_path(item, &action.target, ctx)?.cloned();
        let Some(current) = current else {
            continue;
        };
        let delta = eval_operand(item, &action.value, ctx)?
            .ok_or_else(|| ExprError::Validation("DELETE value resolved to nothing".into()))?;
        let segs = ctx.resolve_path(&action.target)?;
        match (current, delta) {
            (AttributeValue::SS(mut c), AttributeValue::SS(d)) => {
                for v in d {
                    c.remove(&v);
                }
                if c.is_empty() {
                    remove_path(item, &segs)?;
                } else {
                    set_path(item, &segs, AttributeValue::SS(c))?;
                }
            }
            (AttributeValue::NS(mut c), AttributeValue::NS(d)) => {
                c.retain(|v| !d.iter().any(|dv| AttributeValue::N(v.clone()) == AttributeValue::N(dv.clone())));
                if c.is_empty() {
                    remove_path(item, &segs)?;
                } else {
                    set_path(item, &segs, AttributeValue::NS(c))?;
                }
            }
            (AttributeValue::BS(mut c), AttributeValue::BS(d)) => {
                for v in d {
                    c.remove(&v);
                }
                if c.is_empty() {
                    remove_path(item, &segs)?;
                } else {
                    set_path(item, &segs, AttributeValue::BS(c))?;
                }
            }
            _ => return Err(ExprError::Validation("DELETE requires a set attribute".into())),
        }
    }

    for path in &update.remove {
        let segs = ctx.resolve_path(path)?;
        remove_path(item, &segs)?;
    }

    Ok(())
}

/// Projects `item` down to the attributes named in `proj`, keeping nested
/// structure only for the exact paths requested (§4.3). A missing path is
/// silently omitted, matching read-projection semantics.
pub fn apply_projection(item: &Item, proj: &ProjectionExpr, ctx: &ExprContext) -> Result<Item> {
    let mut out = Item::new();
    for path in &proj.0 {
        let Some(value) = get_path(item, path, ctx)? else {
            continue;
        };
        if let Some(root) = path.root() {
            // Nested paths project their resolved leaf value under the root
            // attribute name rather than reconstructing the intermediate
            // container shape.
            let name = ctx.resolve_name(root)?;
            out.insert(name, value.clone());
        }
    }
    Ok(out)
}
