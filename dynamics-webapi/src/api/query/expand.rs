//! `$expand` rendering

use crate::api::models::Expand;

use super::filters::render_filter;

/// Render the value of `$expand`, or `None` when no entry has a property
///
/// Each entry becomes `property` or `property(<clauses>)` with the clauses in
/// the order `$select`, `$top`, `$orderby`, `$filter`, joined by `;`.
pub fn render_expand(expands: &[Expand]) -> Option<String> {
    let rendered: Vec<String> = expands
        .iter()
        .filter(|expand| !expand.property.is_empty())
        .map(render_one)
        .collect();

    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(","))
    }
}

fn render_one(expand: &Expand) -> String {
    let mut clauses = Vec::new();

    if !expand.select.is_empty() {
        clauses.push(format!("$select={}", expand.select.join(",")));
    }
    if let Some(top) = expand.top.filter(|top| *top > 0) {
        clauses.push(format!("$top={}", top));
    }
    if !expand.order_by.is_empty() {
        clauses.push(format!("$orderby={}", expand.order_by.join(",")));
    }
    if let Some(filter) = expand.filter.as_deref().filter(|f| !f.is_empty()) {
        clauses.push(format!("$filter={}", render_filter(filter)));
    }

    if clauses.is_empty() {
        expand.property.clone()
    } else {
        format!("{}({})", expand.property, clauses.join(";"))
    }
}
