//! Database administration commands. Output goes to stdout as plain tables.

use anyhow::Result;
use ecopark_db::Removed;
use ecopark_models::{PaymentMethod, PurchaseDetail, TicketRecord, TicketTier};
use sqlx::SqlitePool;

/// `15000` → `$15,000`
fn money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}${grouped}")
}

fn ticket_line(t: &TicketRecord) -> String {
    format!("Age {:<3} {:<8} {}", t.edad, t.tipo_entrada, money(t.price()))
}

fn print_purchase(detail: &PurchaseDetail) {
    let p = &detail.purchase;
    println!("Purchase #{}", p.id);
    println!("  Customer:   {} <{}>", detail.user.nombre, detail.user.email);
    println!("  Visit date: {}", p.fecha_visita);
    println!("  Bought at:  {}", p.fecha_compra.as_deref().unwrap_or("-"));
    println!("  Payment:    {}", p.medio_pago);
    println!("  Tickets:    {}", p.cantidad);
    for (i, ticket) in detail.tickets.iter().enumerate() {
        println!("    {}. {}", i + 1, ticket_line(ticket));
    }
    println!("  Total:      {}", money(detail.total()));
}

fn print_removed(removed: &Removed) {
    println!(
        "Removed {} user(s), {} purchase(s), {} ticket(s)",
        removed.users, removed.purchases, removed.tickets
    );
}

fn abort_without_confirmation() {
    println!("Nothing deleted. Re-run with --yes to confirm.");
}

pub async fn list_users(pool: &SqlitePool) -> Result<()> {
    let users = ecopark_db::list_users(pool).await?;
    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }
    println!("{:<6} {:<30} {}", "ID", "Email", "Name");
    println!("{}", "-".repeat(60));
    for u in &users {
        println!("{:<6} {:<30} {}", u.id, u.email, u.nombre);
    }
    println!("\n{} user(s) total", users.len());
    Ok(())
}

pub async fn list_purchases(pool: &SqlitePool) -> Result<()> {
    let purchases = ecopark_db::list_purchases(pool).await?;
    if purchases.is_empty() {
        println!("No purchases recorded.");
        return Ok(());
    }
    for detail in &purchases {
        print_purchase(detail);
        println!("{}", "-".repeat(60));
    }
    println!("\n{} purchase(s) total", purchases.len());
    Ok(())
}

pub async fn show_purchase(pool: &SqlitePool, purchase_id: i64) -> Result<()> {
    match ecopark_db::get_purchase(pool, purchase_id).await? {
        Some(detail) => print_purchase(&detail),
        None => println!("No purchase with id {purchase_id}."),
    }
    Ok(())
}

pub async fn show_stats(pool: &SqlitePool) -> Result<()> {
    let stats = ecopark_db::stats(pool).await?;

    println!("Overview");
    println!("  Users:                 {}", stats.users);
    println!("  Purchases:             {}", stats.purchases);
    println!("  Tickets:               {}", stats.tickets);
    println!("  Tickets per purchase:  {:.1}", stats.average_tickets());

    println!("\nPayment methods");
    for (method, count) in [
        (PaymentMethod::Cash, stats.cash_purchases),
        (PaymentMethod::Card, stats.card_purchases),
    ] {
        println!("  {:<9} {count} ({:.1}%)", method.as_str(), stats.share_of_purchases(count));
    }

    println!("\nTicket tiers");
    for (tier, count) in [
        (TicketTier::Regular, stats.regular_tickets),
        (TicketTier::Vip, stats.vip_tickets),
    ] {
        println!("  {:<9} {count} ({})", tier.as_str(), money(count * tier.price()));
    }

    println!("\nRevenue");
    println!("  Total:                 {}", money(stats.revenue));
    println!("  Per purchase:          {}", money(stats.average_revenue().round() as i64));

    if let Some(latest) = &stats.latest {
        println!("\nLatest purchase: {} visiting on {}", latest.nombre, latest.fecha_visita);
    }
    Ok(())
}

pub async fn clear_purchases(pool: &SqlitePool, confirmed: bool) -> Result<()> {
    let stats = ecopark_db::stats(pool).await?;
    if stats.purchases == 0 && stats.tickets == 0 {
        println!("No purchases to clear.");
        return Ok(());
    }
    println!(
        "{} purchase(s) and {} ticket(s) will be deleted; {} user(s) are kept.",
        stats.purchases, stats.tickets, stats.users
    );
    if !confirmed {
        abort_without_confirmation();
        return Ok(());
    }
    print_removed(&ecopark_db::clear_purchases(pool).await?);
    Ok(())
}

pub async fn clear_all(pool: &SqlitePool, confirmed: bool) -> Result<()> {
    let stats = ecopark_db::stats(pool).await?;
    println!(
        "ALL data will be deleted: {} user(s), {} purchase(s), {} ticket(s).",
        stats.users, stats.purchases, stats.tickets
    );
    if !confirmed {
        abort_without_confirmation();
        return Ok(());
    }
    print_removed(&ecopark_db::clear_all(pool).await?);
    Ok(())
}

pub async fn delete_purchase(pool: &SqlitePool, purchase_id: i64, confirmed: bool) -> Result<()> {
    let Some(detail) = ecopark_db::get_purchase(pool, purchase_id).await? else {
        println!("No purchase with id {purchase_id}.");
        return Ok(());
    };
    println!(
        "Purchase #{purchase_id} and its {} ticket(s) will be deleted.",
        detail.tickets.len()
    );
    if !confirmed {
        abort_without_confirmation();
        return Ok(());
    }
    if let Some(removed) = ecopark_db::delete_purchase(pool, purchase_id).await? {
        print_removed(&removed);
    }
    Ok(())
}

pub async fn delete_user(pool: &SqlitePool, user_id: i64, confirmed: bool) -> Result<()> {
    let Some(user) = ecopark_db::get_user(pool, user_id).await? else {
        println!("No user with id {user_id}.");
        return Ok(());
    };
    let purchases = ecopark_db::list_purchases_for_user(pool, user_id).await?;
    let tickets: i64 = purchases.iter().map(|p| p.cantidad).sum();
    println!(
        "User {} <{}> will be deleted with {} purchase(s) and {tickets} ticket(s).",
        user.nombre,
        user.email,
        purchases.len()
    );
    if !confirmed {
        abort_without_confirmation();
        return Ok(());
    }
    if let Some(removed) = ecopark_db::delete_user(pool, user_id).await? {
        print_removed(&removed);
    }
    Ok(())
}
