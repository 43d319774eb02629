//! # Kassa Seed
//!
//! Creates the first admin account and, optionally, a demo shop.
//!
//! ## Usage
//! ```bash
//! # Admin only
//! KASSA_ADMIN_PASSWORD=change-me-please cargo run -p kassa-api --bin kassa-seed
//!
//! # Admin plus a demo shop with staff and products
//! cargo run -p kassa-api --bin kassa-seed -- --password change-me-please --demo
//!
//! # Specify database path
//! cargo run -p kassa-api --bin kassa-seed -- --db ./data/kassa.db --password ...
//! ```
//!
//! ## Demo Shop
//! - Shop "Demo Market" with 100 SMS credits
//! - `demo-owner` (owner) and `demo-cashier` (cashier), same password as the admin
//! - A small grocery catalog with barcodes `4870000000xxx`
//!
//! Running it twice is safe: an existing admin or shop is left alone.

use std::env;

use anyhow::{bail, Context};

use kassa_api::auth::hash_password;
use kassa_core::validation::{validate_password, validate_username};
use kassa_core::{NewProduct, NewShop, PageRequest, Role, Shop};
use kassa_db::{Database, DbConfig};

/// Environment variable read when `--password` is not given.
const PASSWORD_ENV: &str = "KASSA_ADMIN_PASSWORD";

/// (name, category, bought, sale, stock), prices in cents.
const DEMO_PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("Coca-Cola 0.5L", "Beverages", 45_00, 60_00, 48),
    ("Sprite 0.5L", "Beverages", 45_00, 60_00, 36),
    ("Mineral Water 1L", "Beverages", 25_00, 40_00, 60),
    ("Black Tea 100g", "Beverages", 90_00, 130_00, 12),
    ("White Bread", "Bakery", 28_00, 35_00, 20),
    ("Lepyoshka", "Bakery", 20_00, 30_00, 25),
    ("Milk 1L", "Dairy", 70_00, 85_00, 18),
    ("Kefir 1L", "Dairy", 65_00, 80_00, 4),
    ("Butter 200g", "Dairy", 150_00, 190_00, 10),
    ("Eggs x10", "Dairy", 110_00, 140_00, 3),
    ("Rice 1kg", "Grocery", 95_00, 120_00, 30),
    ("Sugar 1kg", "Grocery", 75_00, 92_00, 22),
    ("Sunflower Oil 1L", "Grocery", 140_00, 175_00, 14),
    ("Pasta 500g", "Grocery", 45_00, 60_00, 40),
    ("Chocolate Bar", "Snacks", 55_00, 75_00, 50),
    ("Sunflower Seeds", "Snacks", 30_00, 45_00, 2),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kassa.db");
    let mut username = String::from("admin");
    let mut password = env::var(PASSWORD_ENV).ok();
    let mut demo = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--username" | "-u" => {
                if i + 1 < args.len() {
                    username = args[i + 1].clone();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--demo" => demo = true,
            "--help" | "-h" => {
                println!("Kassa Seed");
                println!();
                println!("Usage: kassa-seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>         Database file path (default: ./kassa.db)");
                println!("  -u, --username <NAME>   Admin username (default: admin)");
                println!("  -p, --password <PASS>   Admin password (or {})", PASSWORD_ENV);
                println!("      --demo              Also create a demo shop");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            other => bail!("Unknown argument: {} (see --help)", other),
        }
        i += 1;
    }

    let Some(password) = password else {
        bail!("An admin password is required: pass --password or set {}", PASSWORD_ENV);
    };
    validate_username(&username).context("Invalid admin username")?;
    validate_password(&password).context("Invalid admin password")?;

    println!("🌱 Kassa Seed");
    println!("=============");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("Failed to open database")?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let hash = hash_password(&password)?;

    let admins = db.users().count_admins().await?;
    if admins > 0 {
        println!("⚠ {} admin account(s) already exist, skipping admin", admins);
    } else {
        db.users()
            .create(None, &username, "Administrator", Role::Admin, &hash)
            .await?;
        println!("✓ Created admin '{}'", username);
    }

    if demo {
        seed_demo(&db, &hash).await?;
    }

    db.close().await;

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

async fn seed_demo(db: &Database, password_hash: &str) -> anyhow::Result<()> {
    println!();

    let existing = db.shops().list(PageRequest::new(1, 1)).await?;
    if existing.total > 0 {
        println!("⚠ Database already has {} shop(s)", existing.total);
        println!("  Skipping demo shop to avoid duplicates.");
        return Ok(());
    }

    let shop: Shop = db
        .shops()
        .create(
            NewShop {
                name: "Demo Market".to_string(),
                owner_name: "Demo Owner".to_string(),
                phone: Some("+996555000000".to_string()),
                address: Some("1 Market Street".to_string()),
            }
            .validated()?,
        )
        .await?;
    db.shops().credit_sms(&shop.id, 100).await?;
    println!("✓ Created shop '{}' ({})", shop.name, shop.id);

    for (username, display, role) in [
        ("demo-owner", "Demo Owner", Role::Owner),
        ("demo-cashier", "Demo Cashier", Role::Cashier),
    ] {
        db.users()
            .create(Some(&shop.id), username, display, role, password_hash)
            .await?;
        println!("✓ Created {} '{}'", role.as_str(), username);
    }

    for (idx, (name, category, bought, sale, stock)) in DEMO_PRODUCTS.iter().enumerate() {
        let product = NewProduct {
            name: name.to_string(),
            barcode: Some(format!("4870000000{:03}", idx + 1)),
            category: Some(category.to_string()),
            bought_price: *bought,
            sale_price: *sale,
            stock: *stock,
            low_stock_threshold: None,
        }
        .validated()?;

        if let Err(e) = db.products().create(&shop.id, product).await {
            eprintln!("Failed to insert {}: {}", name, e);
        }
    }
    println!("✓ Created {} products", DEMO_PRODUCTS.len());

    Ok(())
}
