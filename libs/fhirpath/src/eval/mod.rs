//! The tree-walking evaluator
//!
//! A single recursive async walk over the bound tree. Only the
//! terminology functions ever suspend; the synchronous entry point drives
//! the same walker with suspension disallowed. Macro arguments
//! (`where`, `select`, `repeat`, `aggregate`, `iif`, …) are bound
//! subtrees evaluated against per-item scopes; `$this`/`$index`/`$total`
//! and the defined-variable scope are saved and restored around each
//! iteration.

pub(crate) mod aggregate;
pub(crate) mod combining;
pub(crate) mod conversion;
pub(crate) mod existence;
pub(crate) mod math;
pub(crate) mod navigation;
pub(crate) mod strings;
pub(crate) mod subsetting;
pub(crate) mod terminology;
pub(crate) mod types;

use futures::future::LocalBoxFuture;

use crate::ast::{EqualityOperator, MembershipOperator, TypeOperator};
use crate::compile::{BoolOpKind, BoundArg, BoundFunction, BoundNode, TypeName};
use crate::context::EvalContext;
use crate::distinct::{self, SeenSet};
use crate::error::{Error, Result};
use crate::ops;
use crate::registry::fid;
use crate::value::{Collection, Value};

/// Evaluate a bound node against an input focus.
pub(crate) fn eval<'a>(
    node: &'a BoundNode,
    input: Collection,
    ctx: &'a mut EvalContext,
) -> LocalBoxFuture<'a, Result<Collection>> {
    Box::pin(async move {
        match node {
            BoundNode::Literal(value) => Ok(Collection::singleton(value.clone())),
            BoundNode::Empty => Ok(Collection::empty()),

            BoundNode::This => Ok(ctx
                .this
                .clone()
                .unwrap_or_else(|| ctx.root.clone())),
            BoundNode::Index => Ok(ctx
                .index
                .map(|i| Collection::singleton(Value::integer(i)))
                .unwrap_or_default()),
            BoundNode::Total => Ok(ctx.total.clone().unwrap_or_default()),

            BoundNode::EnvVar(name) => ctx.lookup_var(name),

            BoundNode::Member(name) => {
                let model = ctx.model.clone();
                navigation::member(&input, name, model.as_deref())
            }

            BoundNode::Invocation { target, invocation } => {
                let focus = eval(target, input, &mut *ctx).await?;
                eval(invocation, focus, &mut *ctx).await
            }

            BoundNode::Function(function) => eval_function(function, input, ctx).await,

            BoundNode::UserFunction { name, spec, args } => {
                if spec.nullable && input.is_empty() {
                    return Ok(Collection::empty());
                }
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(eval(arg, input.clone(), &mut *ctx).await?);
                }
                (spec.func)(&input, &evaluated)
                    .map_err(|e| match e {
                        Error::Domain(msg) => Error::Domain(format!("{}(): {}", name, msg)),
                        other => other,
                    })
            }

            BoundNode::Indexer { target, index } => {
                let focus = eval(target, input.clone(), &mut *ctx).await?;
                let index = eval(index, input, &mut *ctx).await?;
                if index.is_empty() {
                    return Ok(Collection::empty());
                }
                let i = index.as_integer()?;
                if i < 0 {
                    return Ok(Collection::empty());
                }
                Ok(focus
                    .get(i as usize)
                    .map(|v| Collection::singleton(v.clone()))
                    .unwrap_or_default())
            }

            BoundNode::Polarity { negative, operand } => {
                let value = eval(operand, input, &mut *ctx).await?;
                ops::arithmetic::negate(&value, *negative)
            }

            BoundNode::Arith { op, left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                ops::arithmetic::arithmetic(*op, &a, &b)
            }

            BoundNode::Concat { left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                ops::arithmetic::concat(&a, &b)
            }

            BoundNode::Union { left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                Ok(distinct::union(&a, &b))
            }

            BoundNode::Equality { op, left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                Ok(match op {
                    EqualityOperator::Equal => boolean_or_empty(
                        ops::equality::equal_collections(&a, &b),
                    ),
                    EqualityOperator::NotEqual => boolean_or_empty(
                        ops::equality::equal_collections(&a, &b).map(|r| !r),
                    ),
                    EqualityOperator::Equivalent => Collection::singleton(Value::boolean(
                        ops::equality::equivalent_collections(&a, &b),
                    )),
                    EqualityOperator::NotEquivalent => Collection::singleton(Value::boolean(
                        !ops::equality::equivalent_collections(&a, &b),
                    )),
                })
            }

            BoundNode::Inequality { op, left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                ops::compare::compare_collections(*op, &a, &b)
            }

            BoundNode::Membership { op, left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let b = eval(right, input, &mut *ctx).await?;
                match op {
                    MembershipOperator::In => membership(&a, &b),
                    MembershipOperator::Contains => membership(&b, &a),
                }
            }

            BoundNode::BoolOp { op, left, right } => {
                let a = eval(left, input.clone(), &mut *ctx).await?;
                let lhs = a.as_boolean_singleton()?;

                // Short-circuit where the left operand already decides.
                match (op, lhs) {
                    (BoolOpKind::And, Some(false)) => {
                        return Ok(Collection::singleton(Value::boolean(false)));
                    }
                    (BoolOpKind::Or, Some(true)) => {
                        return Ok(Collection::singleton(Value::boolean(true)));
                    }
                    (BoolOpKind::Implies, Some(false)) => {
                        return Ok(Collection::singleton(Value::boolean(true)));
                    }
                    _ => {}
                }

                let b = eval(right, input, &mut *ctx).await?;
                let rhs = b.as_boolean_singleton()?;
                let out = match op {
                    BoolOpKind::And => ops::boolean::and(lhs, rhs),
                    BoolOpKind::Or => ops::boolean::or(lhs, rhs),
                    BoolOpKind::Xor => ops::boolean::xor(lhs, rhs),
                    BoolOpKind::Implies => ops::boolean::implies(lhs, rhs),
                };
                Ok(boolean_or_empty(out))
            }

            BoundNode::TypeOp {
                op,
                operand,
                type_name,
            } => {
                let value = eval(operand, input, &mut *ctx).await?;
                type_operation(*op, &value, type_name, ctx)
            }
        }
    })
}

fn boolean_or_empty(value: Option<bool>) -> Collection {
    value
        .map(|b| Collection::singleton(Value::boolean(b)))
        .unwrap_or_default()
}

/// `in`: is the (singleton) needle a member of the haystack?
fn membership(needle: &Collection, haystack: &Collection) -> Result<Collection> {
    if needle.is_empty() {
        return Ok(Collection::empty());
    }
    let item = needle
        .singleton_item("membership left operand")?
        .expect("non-empty");
    if haystack.is_empty() {
        return Ok(Collection::singleton(Value::boolean(false)));
    }
    let found = haystack
        .iter()
        .any(|candidate| ops::equality::equal_values(item, candidate) == Some(true));
    Ok(Collection::singleton(Value::boolean(found)))
}

fn type_operation(
    op: TypeOperator,
    value: &Collection,
    type_name: &TypeName,
    ctx: &EvalContext,
) -> Result<Collection> {
    if value.is_empty() {
        return Ok(Collection::empty());
    }
    let item = value
        .singleton_item("type operation operand")?
        .expect("non-empty");
    let model = ctx.model.as_deref();
    let matches = types::value_is_type(item, type_name, model);
    match op {
        TypeOperator::Is => Ok(Collection::singleton(Value::boolean(matches))),
        TypeOperator::As => Ok(if matches {
            Collection::singleton(item.clone())
        } else {
            Collection::empty()
        }),
    }
}

fn arg_expr(arg: &BoundArg) -> &BoundNode {
    match arg {
        BoundArg::Expr(node) => node,
        _ => unreachable!("argument bound as a non-expression"),
    }
}

fn arg_type(arg: &BoundArg) -> &TypeName {
    match arg {
        BoundArg::Type(name) => name,
        _ => unreachable!("argument bound as a non-type"),
    }
}

/// Evaluate an eager argument (`Value` against the input focus,
/// `AnyAtRoot` against the evaluation root).
async fn eval_arg(arg: &BoundArg, input: &Collection, ctx: &mut EvalContext) -> Result<Collection> {
    match arg {
        BoundArg::Value { node, .. } => eval(node, input.clone(), ctx).await,
        BoundArg::Root(node) => {
            let root = ctx.root.clone();
            eval(node, root, ctx).await
        }
        BoundArg::Expr(node) => eval(node, input.clone(), ctx).await,
        BoundArg::Type(_) => unreachable!("type captures are not evaluated"),
    }
}

/// Optional integer argument; an empty argument collection is `None`.
async fn arg_integer(
    arg: &BoundArg,
    input: &Collection,
    ctx: &mut EvalContext,
) -> Result<Option<i64>> {
    let value = eval_arg(arg, input, ctx).await?;
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(value.as_integer()?))
}

/// Evaluate a macro body against one item's scope.
async fn eval_for_item(
    expr: &BoundNode,
    item: &Value,
    index: usize,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    let scope = ctx.defined_scope();
    ctx.this = Some(Collection::singleton(item.clone()));
    ctx.index = Some(index as i64);
    let out = eval(expr, Collection::singleton(item.clone()), ctx).await;
    ctx.restore_defined_scope(scope);
    out
}

async fn eval_function(
    function: &BoundFunction,
    input: Collection,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    let spec = function.spec;
    if spec.nullable && input.is_empty() {
        return Ok(Collection::empty());
    }
    if spec.is_async && !ctx.async_mode.allows_suspension() {
        return Err(Error::AsyncDisallowed(format!("{}()", spec.name)));
    }
    let args = &function.args;
    let model = ctx.model.clone();

    match spec.id {
        fid::NOT => Ok(boolean_or_empty(ops::boolean::not(
            input.as_boolean_singleton()?,
        ))),

        // --- Existence ---
        fid::EMPTY => existence::empty(&input),
        fid::COUNT => existence::count(&input),
        fid::EXISTS => {
            if args.is_empty() {
                return Ok(Collection::singleton(Value::boolean(!input.is_empty())));
            }
            let filtered = eval_where(arg_expr(&args[0]), &input, ctx).await?;
            Ok(Collection::singleton(Value::boolean(!filtered.is_empty())))
        }
        fid::ALL => {
            let saved = save_iteration(ctx);
            let mut result = true;
            for (i, item) in input.iter().enumerate() {
                let criteria = eval_for_item(arg_expr(&args[0]), item, i, ctx).await?;
                if criteria.as_boolean_singleton()? != Some(true) {
                    result = false;
                    break;
                }
            }
            restore_iteration(ctx, saved);
            Ok(Collection::singleton(Value::boolean(result)))
        }
        fid::ALL_TRUE => existence::all_true(&input),
        fid::ANY_TRUE => existence::any_true(&input),
        fid::ALL_FALSE => existence::all_false(&input),
        fid::ANY_FALSE => existence::any_false(&input),
        fid::SUBSET_OF => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            existence::subset_of(&input, &other)
        }
        fid::SUPERSET_OF => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            existence::superset_of(&input, &other)
        }
        fid::DISTINCT => existence::distinct_fn(&input),
        fid::IS_DISTINCT => existence::is_distinct(&input),
        fid::HAS_VALUE => existence::has_value(&input),

        // --- Filtering and projection ---
        fid::WHERE => eval_where(arg_expr(&args[0]), &input, ctx).await,
        fid::SELECT => {
            let saved = save_iteration(ctx);
            let mut out = Collection::empty();
            for (i, item) in input.iter().enumerate() {
                let projected = eval_for_item(arg_expr(&args[0]), item, i, ctx).await?;
                out.append(projected);
            }
            restore_iteration(ctx, saved);
            Ok(out)
        }
        fid::REPEAT => eval_repeat(arg_expr(&args[0]), &input, ctx).await,
        fid::OF_TYPE => types::of_type(&input, arg_type(&args[0]), model.as_deref()),
        fid::EXTENSION => {
            let url = eval_arg(&args[0], &input, ctx).await?;
            if url.is_empty() {
                return Ok(Collection::empty());
            }
            navigation::extension(&input, &url.as_string()?, model.as_deref())
        }

        // --- Subsetting ---
        fid::SINGLE => subsetting::single(&input),
        fid::FIRST => subsetting::first(&input),
        fid::LAST => subsetting::last(&input),
        fid::TAIL => subsetting::tail(&input),
        fid::SKIP => match arg_integer(&args[0], &input, ctx).await? {
            Some(n) => subsetting::skip(&input, n),
            None => Ok(Collection::empty()),
        },
        fid::TAKE => match arg_integer(&args[0], &input, ctx).await? {
            Some(n) => subsetting::take(&input, n),
            None => Ok(Collection::empty()),
        },
        fid::INTERSECT => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            subsetting::intersect(&input, &other)
        }
        fid::EXCLUDE => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            subsetting::exclude(&input, &other)
        }

        // --- Combining ---
        fid::UNION => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            combining::union(&input, &other)
        }
        fid::COMBINE => {
            let other = eval_arg(&args[0], &input, ctx).await?;
            combining::combine(&input, &other)
        }

        // --- Strings ---
        fid::TO_STRING => strings::to_string(&input),
        fid::INDEX_OF => {
            let search = eval_arg(&args[0], &input, ctx).await?;
            strings::index_of(&input, &search)
        }
        fid::SUBSTRING => {
            let start = arg_integer(&args[0], &input, ctx).await?;
            let length = match args.get(1) {
                Some(arg) => Some(arg_integer(arg, &input, ctx).await?),
                None => None,
            };
            strings::substring(&input, start, length)
        }
        fid::STARTS_WITH => {
            let prefix = eval_arg(&args[0], &input, ctx).await?;
            strings::starts_with(&input, &prefix)
        }
        fid::ENDS_WITH => {
            let suffix = eval_arg(&args[0], &input, ctx).await?;
            strings::ends_with(&input, &suffix)
        }
        fid::CONTAINS => {
            let needle = eval_arg(&args[0], &input, ctx).await?;
            strings::contains_str(&input, &needle)
        }
        fid::UPPER => strings::upper(&input),
        fid::LOWER => strings::lower(&input),
        fid::REPLACE => {
            let old = eval_arg(&args[0], &input, ctx).await?;
            let new = eval_arg(&args[1], &input, ctx).await?;
            strings::replace(&input, &old, &new)
        }
        fid::MATCHES => {
            let pattern = eval_arg(&args[0], &input, ctx).await?;
            strings::matches(&input, &pattern)
        }
        fid::REPLACE_MATCHES => {
            let pattern = eval_arg(&args[0], &input, ctx).await?;
            let replacement = eval_arg(&args[1], &input, ctx).await?;
            strings::replace_matches(&input, &pattern, &replacement)
        }
        fid::LENGTH => strings::length(&input),
        fid::TO_CHARS => strings::to_chars(&input),
        fid::TRIM => strings::trim(&input),
        fid::ENCODE => {
            let format = eval_arg(&args[0], &input, ctx).await?;
            strings::encode(&input, &format)
        }
        fid::DECODE => {
            let format = eval_arg(&args[0], &input, ctx).await?;
            strings::decode(&input, &format)
        }
        fid::SPLIT => {
            let separator = eval_arg(&args[0], &input, ctx).await?;
            strings::split(&input, &separator)
        }
        fid::JOIN => {
            let separator = match args.first() {
                Some(arg) => Some(eval_arg(arg, &input, ctx).await?),
                None => None,
            };
            strings::join(&input, separator.as_ref())
        }

        // --- Math ---
        fid::ABS => math::abs(&input),
        fid::CEILING => math::ceiling(&input),
        fid::EXP => math::exp(&input),
        fid::FLOOR => math::floor(&input),
        fid::LN => math::ln(&input),
        fid::LOG => {
            let base = eval_arg(&args[0], &input, ctx).await?;
            math::log(&input, &base)
        }
        fid::POWER => {
            let exponent = eval_arg(&args[0], &input, ctx).await?;
            math::power(&input, &exponent)
        }
        fid::ROUND => {
            let precision = match args.first() {
                Some(arg) => arg_integer(arg, &input, ctx).await?,
                None => None,
            };
            math::round(&input, precision)
        }
        fid::SQRT => math::sqrt(&input),
        fid::TRUNCATE => math::truncate(&input),

        // --- Conversion ---
        fid::IIF => eval_iif(function, input, ctx).await,
        fid::TO_BOOLEAN => conversion::to_boolean(&input),
        fid::CONVERTS_TO_BOOLEAN => conversion::converts_to_boolean(&input),
        fid::TO_INTEGER => conversion::to_integer(&input),
        fid::CONVERTS_TO_INTEGER => conversion::converts_to_integer(&input),
        fid::TO_LONG => conversion::to_long(&input),
        fid::CONVERTS_TO_LONG => conversion::converts_to_long(&input),
        fid::TO_DECIMAL => conversion::to_decimal(&input),
        fid::CONVERTS_TO_DECIMAL => conversion::converts_to_decimal(&input),
        fid::CONVERTS_TO_STRING => conversion::converts_to_string(&input),
        fid::TO_DATE => conversion::to_date(&input),
        fid::CONVERTS_TO_DATE => conversion::converts_to_date(&input),
        fid::TO_DATETIME => conversion::to_datetime(&input),
        fid::CONVERTS_TO_DATETIME => conversion::converts_to_datetime(&input),
        fid::TO_TIME => conversion::to_time(&input),
        fid::CONVERTS_TO_TIME => conversion::converts_to_time(&input),
        fid::TO_QUANTITY => {
            let unit = match args.first() {
                Some(arg) => Some(eval_arg(arg, &input, ctx).await?),
                None => None,
            };
            conversion::to_quantity(&input, unit.as_ref())
        }
        fid::CONVERTS_TO_QUANTITY => {
            let unit = match args.first() {
                Some(arg) => Some(eval_arg(arg, &input, ctx).await?),
                None => None,
            };
            conversion::converts_to_quantity(&input, unit.as_ref())
        }

        // --- Navigation ---
        fid::CHILDREN => navigation::children(&input, model.as_deref()),
        fid::DESCENDANTS => navigation::descendants(&input, model.as_deref()),

        // --- Type tests ---
        fid::IS_FN => type_operation(TypeOperator::Is, &input, arg_type(&args[0]), ctx),
        fid::AS_FN => type_operation(TypeOperator::As, &input, arg_type(&args[0]), ctx),

        // --- Utility ---
        fid::TRACE => {
            let label = eval_arg(&args[0], &input, ctx).await?;
            let label = label.as_string()?;
            let traced = match args.get(1) {
                Some(arg) => eval(arg_expr(arg), input.clone(), ctx).await?,
                None => input.clone(),
            };
            if let Some(sink) = &ctx.trace {
                sink(&label, &traced);
            }
            Ok(input)
        }
        fid::DEFINE_VARIABLE => {
            let name = eval_arg(&args[0], &input, ctx).await?;
            let name = name.as_string()?;
            let value = match args.get(1) {
                Some(arg) => {
                    let saved = save_iteration(ctx);
                    ctx.this = Some(input.clone());
                    let out = eval(arg_expr(arg), input.clone(), ctx).await;
                    restore_iteration(ctx, saved);
                    out?
                }
                None => input.clone(),
            };
            ctx.define_var(&name, value)?;
            Ok(input)
        }
        fid::NOW => Ok(Collection::singleton(ctx.now.now_value())),
        fid::TODAY => Ok(Collection::singleton(ctx.now.today_value())),
        fid::TIME_OF_DAY => Ok(Collection::singleton(ctx.now.time_of_day_value())),

        // --- Aggregates ---
        fid::AGGREGATE => eval_aggregate(function, &input, ctx).await,
        fid::SUM => aggregate::sum(&input),
        fid::MIN => aggregate::min(&input),
        fid::MAX => aggregate::max(&input),
        fid::AVG => aggregate::avg(&input),

        // --- SDC terminology ---
        fid::WEIGHT => terminology::weight(&input, ctx).await,

        other => Err(Error::UnknownFunction(format!(
            "function id {} ({})",
            other, spec.name
        ))),
    }
}

type SavedIteration = (Option<Collection>, Option<i64>, Option<Collection>);

fn save_iteration(ctx: &mut EvalContext) -> SavedIteration {
    (ctx.this.take(), ctx.index.take(), ctx.total.take())
}

fn restore_iteration(ctx: &mut EvalContext, saved: SavedIteration) {
    ctx.this = saved.0;
    ctx.index = saved.1;
    ctx.total = saved.2;
}

async fn eval_where(
    expr: &BoundNode,
    input: &Collection,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    let saved = save_iteration(ctx);
    let mut out = Collection::empty();
    for (i, item) in input.iter().enumerate() {
        let criteria = eval_for_item(expr, item, i, ctx).await?;
        if criteria.as_boolean_singleton()? == Some(true) {
            out.push(item.clone());
        }
    }
    restore_iteration(ctx, saved);
    Ok(out)
}

/// Fixed-point projection: apply the projection to newly discovered items
/// until none appear, deduplicating against the running result.
async fn eval_repeat(
    expr: &BoundNode,
    input: &Collection,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    let items: Vec<&Value> = input.iter().collect();
    let mut seen = SeenSet::for_items(&items);
    let mut result = Collection::empty();
    let mut frontier: Vec<Value> = input.iter().cloned().collect();

    let saved = save_iteration(ctx);
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (i, item) in frontier.iter().enumerate() {
            let projected = eval_for_item(expr, item, i, ctx).await?;
            for value in projected {
                if seen.insert(&value) {
                    result.push(value.clone());
                    next.push(value);
                }
            }
        }
        frontier = next;
    }
    restore_iteration(ctx, saved);
    Ok(result)
}

/// Lazy conditional: only the chosen branch evaluates.
async fn eval_iif(
    function: &BoundFunction,
    input: Collection,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    if input.len() > 1 {
        return Err(Error::Singleton(format!(
            "iif() requires at most one input item, got {}",
            input.len()
        )));
    }

    let saved = save_iteration(ctx);
    if !input.is_empty() {
        ctx.this = Some(input.clone());
    }
    let condition = eval(arg_expr(&function.args[0]), input.clone(), ctx).await;
    restore_iteration(ctx, saved);
    let condition = condition?.as_boolean_singleton()?;

    match condition {
        Some(true) => eval(arg_expr(&function.args[1]), input, ctx).await,
        _ => match function.args.get(2) {
            Some(arg) => eval(arg_expr(arg), input, ctx).await,
            None => Ok(Collection::empty()),
        },
    }
}

/// Left-to-right fold with `$this`, `$index` and `$total` in scope; the
/// aggregator's result becomes the next `$total`.
async fn eval_aggregate(
    function: &BoundFunction,
    input: &Collection,
    ctx: &mut EvalContext,
) -> Result<Collection> {
    let saved = save_iteration(ctx);

    let init = match function.args.get(1) {
        Some(arg) => eval_arg(arg, input, ctx).await?,
        None => Collection::empty(),
    };

    let mut total = init;
    for (i, item) in input.iter().enumerate() {
        let scope = ctx.defined_scope();
        ctx.this = Some(Collection::singleton(item.clone()));
        ctx.index = Some(i as i64);
        ctx.total = Some(total.clone());
        let out = eval(
            arg_expr(&function.args[0]),
            Collection::singleton(item.clone()),
            ctx,
        )
        .await;
        ctx.restore_defined_scope(scope);
        total = out?;
    }

    restore_iteration(ctx, saved);
    Ok(total)
}
