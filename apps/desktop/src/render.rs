use std::fmt::Write as _;

use chrono::NaiveDate;
use client_core::{Notice, NoticeLevel, Statistics};
use shared::domain::{Order, OrderId};

const SHORT_ID_LEN: usize = 8;

pub fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

pub fn short_id(order_id: OrderId) -> String {
    order_id.to_string().chars().take(SHORT_ID_LEN).collect()
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
    clipped.push('~');
    clipped
}

pub fn order_table(orders: &[&Order], today: NaiveDate) -> String {
    if orders.is_empty() {
        return "No orders.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8}  {:<20}  {:<12}  {:<24}  {:>4}  {:>10}  {:<11}  {:<9}  {:<6}",
        "ID", "CLIENT", "CONTACT", "DESCRIPTION", "QTY", "TOTAL", "DELIVERY", "STATUS", "PAID"
    );
    for order in orders {
        let overdue = !order.completed && order.delivery_date < today;
        let delivery = format!(
            "{}{}",
            order.delivery_date.format("%Y-%m-%d"),
            if overdue { "!" } else { "" }
        );
        let _ = writeln!(
            out,
            "{:<8}  {:<20}  {:<12}  {:<24}  {:>4}  {:>10}  {:<11}  {:<9}  {:<6}",
            short_id(order.id),
            clip(&order.client_name, 20),
            clip(&order.contact_number, 12),
            clip(&order.description, 24),
            order.quantity,
            money(order.total_price),
            delivery,
            if order.completed { "done" } else { "pending" },
            if order.paid { "paid" } else { "unpaid" },
        );
    }
    out
}

pub fn order_detail(order: &Order) -> String {
    format!(
        "{id}\n  client:      {client}\n  contact:     {contact}\n  description: {description}\n  \
         quantity:    {quantity} x {price} = {total}\n  delivery:    {delivery}\n  \
         created:     {created}\n  completed:   {completed}\n  paid:        {paid}\n",
        id = order.id,
        client = order.client_name,
        contact = order.contact_number,
        description = order.description,
        quantity = order.quantity,
        price = money(order.unit_price),
        total = money(order.total_price),
        delivery = order.delivery_date.format("%Y-%m-%d"),
        created = order.created_at.format("%Y-%m-%d %H:%M"),
        completed = if order.completed { "yes" } else { "no" },
        paid = if order.paid { "yes" } else { "no" },
    )
}

pub fn statistics(stats: &Statistics) -> String {
    format!(
        "Orders: {total} ({pending} pending, {completed} completed, {overdue} overdue)\n\
         Paid:   {paid} for {paid_amount}\n\
         Unpaid: {unpaid} for {unpaid_amount}\n\
         Completed revenue: {revenue}\n",
        total = stats.total,
        pending = stats.pending,
        completed = stats.completed,
        overdue = stats.overdue,
        paid = stats.paid,
        paid_amount = money(stats.paid_amount),
        unpaid = stats.unpaid,
        unpaid_amount = money(stats.unpaid_amount),
        revenue = money(stats.completed_revenue),
    )
}

pub fn notice_line(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Success => format!("ok: {}", notice.message),
        NoticeLevel::Error => format!("error: {}", notice.message),
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
