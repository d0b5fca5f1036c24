//! Subjects and HTML bodies. Every interpolated value is escaped.

use std::fmt::Write as _;

use crate::gateway::ApiFailure;
use crate::gates::SubstrateMismatch;
use crate::store::{format_timestamp, OrderState};

const PREFIX: &str = "LWS Workflow";

/// A rendered subject and body, recipients are chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub html_body: String,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(body: &mut String, label: &str, value: &str) {
    let _ = write!(body, "<tr><th align=\"left\">{}</th><td>{}</td></tr>", escape(label), escape(value));
}

pub fn order_failed(order_id: i64, step: &str, message: &str, api: Option<&ApiFailure>) -> Rendered {
    let mut body = String::from("<p>An order failed in the LWS workflow and needs attention.</p><table>");
    row(&mut body, "Order", &order_id.to_string());
    row(&mut body, "Step", step);
    row(&mut body, "Message", message);
    if let Some(api) = api {
        row(&mut body, "API entity", &api.entity);
        row(&mut body, "API status", &api.status.map(|s| s.to_string()).unwrap_or_default());
        for message in &api.messages {
            row(&mut body, "API message", message);
        }
    }
    body.push_str("</table>");
    if let Some(raw) = api.map(|a| a.raw.as_str()).filter(|raw| !raw.is_empty()) {
        let _ = write!(body, "<pre>{}</pre>", escape(raw));
    }

    Rendered {
        subject: format!("{PREFIX}: order {order_id} FAILED at {step}"),
        html_body: body,
    }
}

pub fn substrate_mismatch(order_id: i64, mismatch: &SubstrateMismatch) -> Rendered {
    let mut body = String::from(
        "<p>The job requirements print onto a substrate that does not match the order's base item.</p><table>",
    );
    row(&mut body, "Order", &order_id.to_string());
    row(&mut body, "Base item", &mismatch.base_item);
    row(&mut body, "Expected substrate", &mismatch.expected);
    row(&mut body, "Invalid", &mismatch.invalid.join(", "));
    row(&mut body, "Found", &mismatch.found.join(", "));
    body.push_str("</table>");

    Rendered {
        subject: format!("{PREFIX}: printed substrate mismatch on order {order_id}"),
        html_body: body,
    }
}

pub fn items_created(order_id: i64, items: &[String], reason: &str) -> Rendered {
    let mut body = String::from("<p>Items were created in WAIT status and must be approved (APP).</p><ul>");
    for item in items {
        let _ = write!(body, "<li>{}</li>", escape(item));
    }
    let _ = write!(
        body,
        "</ul><p>Order {}: {}</p>",
        order_id,
        escape(reason)
    );

    Rendered {
        subject: format!("{PREFIX}: items awaiting approval for order {order_id}"),
        html_body: body,
    }
}

fn aged_table(body: &mut String, orders: &[(&OrderState, i64)]) {
    body.push_str("<table><tr><th>Order</th><th>Hold step</th><th>Held for</th><th>Reason</th></tr>");
    for (order, age_hours) in orders {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{:.1} days</td><td>{}</td></tr>",
            order.order_id,
            escape(&order.last_step),
            *age_hours as f64 / 24.0,
            escape(order.last_error_summary.as_deref().unwrap_or("")),
        );
    }
    body.push_str("</table>");
}

/// Reminder to CSR for holds past the reminder threshold
pub fn hold_reminder(orders: &[(&OrderState, i64)], after_hours: i64) -> Rendered {
    let mut body = format!(
        "<p>The following orders have been on HOLD for more than {after_hours} hours:</p>"
    );
    aged_table(&mut body, orders);
    body.push_str("<p>Please reconfirm these orders so the workflow can continue.</p>");
    Rendered {
        subject: format!("{PREFIX}: HOLD reminder, {} order(s) need action", orders.len()),
        html_body: body,
    }
}

/// Escalation to admins for holds past the escalation threshold
pub fn hold_escalation(orders: &[(&OrderState, i64)], after_hours: i64) -> Rendered {
    let mut body = format!(
        "<p>The following orders have been on HOLD for more than {after_hours} hours:</p>"
    );
    aged_table(&mut body, orders);
    body.push_str("<p>Please investigate and resolve these orders.</p>");
    Rendered {
        subject: format!("{PREFIX}: HOLD escalation, {} order(s) held over {after_hours}h", orders.len()),
        html_body: body,
    }
}

pub fn hold_summary(orders: &[OrderState]) -> Rendered {
    let mut body = String::from(
        "<p>Orders waiting on a quantity reconfirmation or a manual completion.</p>\
         <table><tr><th>Order</th><th>Step</th><th>Site-B SO</th><th>Since</th><th>Reason</th></tr>",
    );
    for order in orders {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            order.order_id,
            escape(&order.last_step),
            order
                .ids
                .sales_order_site_b
                .map(|so| so.to_string())
                .unwrap_or_default(),
            escape(&order.hold_since.map(format_timestamp).unwrap_or_default()),
            escape(order.last_error_summary.as_deref().unwrap_or("")),
        );
    }
    body.push_str("</table>");

    Rendered {
        subject: format!("{PREFIX}: {} order(s) awaiting reconfirmation", orders.len()),
        html_body: body,
    }
}
