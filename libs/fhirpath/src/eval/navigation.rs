//! Path navigation: the `.` operator, `children()`, `descendants()` and
//! `extension(url)`

use corten_model::Model;

use crate::error::Result;
use crate::value::{Collection, Value, ValueData};

/// Member access for one step of a dotted path. A leading identifier that
/// names the node's own resource type passes the node through
/// (`Patient.name` over a Patient resource).
pub fn member(input: &Collection, name: &str, model: Option<&Model>) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in input.iter() {
        let ValueData::Node(node) = item.data() else {
            continue;
        };
        if name
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && node.resource_type() == Some(name)
        {
            out.push(item.clone());
            continue;
        }
        for child in node.child_by_name(name, model) {
            out.push(Value::node(child));
        }
    }
    Ok(out)
}

/// Immediate children of every node in the input.
pub fn children(input: &Collection, model: Option<&Model>) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in input.iter() {
        if let ValueData::Node(node) = item.data() {
            for child in node.all_children(model) {
                out.push(Value::node(child));
            }
        }
    }
    Ok(out)
}

/// Transitive children, in breadth-first discovery order. The input
/// itself is not part of the result.
pub fn descendants(input: &Collection, model: Option<&Model>) -> Result<Collection> {
    let mut out = Collection::empty();
    let mut frontier = input.clone();
    while !frontier.is_empty() {
        let next = children(&frontier, model)?;
        for item in next.iter() {
            out.push(item.clone());
        }
        frontier = next;
    }
    Ok(out)
}

/// `extension(url)`: shortcut for `extension.where(url = ...)`, reaching
/// through `_field` companions for primitives.
pub fn extension(input: &Collection, url: &str, model: Option<&Model>) -> Result<Collection> {
    let mut out = Collection::empty();
    for item in input.iter() {
        let ValueData::Node(node) = item.data() else {
            continue;
        };
        for child in node.child_by_name("extension", model) {
            let matches = child
                .data()
                .and_then(|d| d.get("url"))
                .and_then(|u| u.as_str())
                .map(|u| u == url)
                .unwrap_or(false);
            if matches {
                out.push(Value::node(child));
            }
        }
    }
    Ok(out)
}
