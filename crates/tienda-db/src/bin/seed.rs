//! # Seed Data Generator
//!
//! Populates a development database with products and distributors.
//!
//! ## Usage
//! ```bash
//! # Generate up to 200 products (default)
//! cargo run -p tienda-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p tienda-db --bin seed -- --count 50
//!
//! # Specify database path
//! cargo run -p tienda-db --bin seed -- --db ./data/tienda.db
//! ```
//!
//! Each product gets an opening `in`/`purchase` movement equal to its
//! stock, so the movement ledger and the stock cache agree from the start.

use chrono::Local;
use std::env;
use tienda_core::distributor::{Channel, Distributor};
use tienda_core::{MovementDirection, MovementReason, NewMovement, Product, ProductState};
use tienda_db::repository::{distributor, movement, product};
use tienda_db::{new_id, Database, DbConfig};

/// Product families for realistic test data
const FAMILIES: &[(&str, &[&str])] = &[
    (
        "Almacén",
        &[
            "Arroz", "Fideos", "Azúcar", "Harina", "Yerba", "Aceite", "Sal", "Lentejas", "Café",
            "Té",
        ],
    ),
    (
        "Bebidas",
        &[
            "Agua", "Gaseosa Cola", "Gaseosa Lima", "Jugo Naranja", "Cerveza", "Soda",
        ],
    ),
    (
        "Lácteos",
        &["Leche", "Yogur", "Queso", "Manteca", "Dulce de Leche"],
    ),
    (
        "Limpieza",
        &["Lavandina", "Detergente", "Jabón en Polvo", "Esponja"],
    ),
];

/// Size variations: (label, price addon in cents)
const SIZES: &[(&str, i64)] = &[("500g", 0), ("1kg", 350), ("Pack x6", 1_200)];

const DISTRIBUTORS: &[(&str, Channel)] = &[
    ("Distribuidora Norte", Channel::Wholesale),
    ("Mayorista del Sur", Channel::Wholesale),
    ("Reparto Barrio Centro", Channel::Retail),
    ("Reparto Villa Nueva", Channel::Retail),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./tienda_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tienda POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./tienda_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tienda POS Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        db.close().await;
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let start = std::time::Instant::now();
    let now = Local::now().naive_local();
    let mut generated = 0;

    let mut tx = db.pool().begin().await?;
    'outer: for (family_idx, (_, names)) in FAMILIES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }
                let seed = family_idx * 100 + name_idx * 10 + size_idx;
                let p = generate_product(name, size, *addon, seed, now);

                product::insert(&mut tx, &p).await?;
                if p.current_stock > 0 {
                    movement::insert(
                        &mut tx,
                        &NewMovement {
                            product_id: p.id.clone(),
                            direction: MovementDirection::In,
                            quantity: p.current_stock,
                            reason: MovementReason::Purchase,
                            recorded_at: now,
                            user_id: "seed".to_string(),
                            note: Some("opening stock".to_string()),
                            sale_id: None,
                            cancelled_by: None,
                            cancellation_reason: None,
                        },
                    )
                    .await?;
                }
                generated += 1;
            }
        }
    }

    for (name, channel) in DISTRIBUTORS {
        distributor::insert_distributor(
            &mut tx,
            &Distributor {
                id: new_id(),
                name: name.to_string(),
                channel: *channel,
                active: true,
                created_at: now,
            },
        )
        .await?;
    }
    tx.commit().await?;

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);
    println!("✓ Added {} distributors", DISTRIBUTORS.len());

    let low = db.products().low_stock().await?;
    println!("  Low stock products: {}", low.len());

    db.close().await;

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single product with deterministic data.
fn generate_product(name: &str, size: &str, price_addon: i64, seed: usize, now: chrono::NaiveDateTime) -> Product {
    // Base price 2.00 - 9.99 plus size addon
    let unit_price_cents = 200 + ((seed * 37) % 800) as i64 + price_addon;

    // Wholesale 75-90% of retail, absent for every fifth product
    let wholesale_price_cents = (seed % 5 != 0).then(|| unit_price_cents * (75 + (seed % 16) as i64) / 100);

    Product {
        id: new_id(),
        name: format!("{} {}", name, size),
        unit_price_cents,
        wholesale_price_cents,
        current_stock: (seed % 61) as i64,
        min_stock: 5,
        state: ProductState::Active,
        created_at: now,
        updated_at: now,
    }
}
