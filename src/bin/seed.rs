use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use uuid::Uuid;
use waterstore_api::{config::AppConfig, db::create_pool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "Customer", "user@example.com", "user123", "customer").await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products: Vec<(&str, &str, &str, Option<&str>, i64, i32)> = vec![
        (
            "Spring Water 600ml",
            "Single-serve bottled spring water",
            "bottle",
            Some("600ml"),
            3500,
            200,
        ),
        (
            "Spring Water 1.5L",
            "Family-size bottled spring water",
            "bottle",
            Some("1.5L"),
            7000,
            120,
        ),
        (
            "Refill Gallon 19L",
            "Returnable 19 litre gallon refill",
            "gallon",
            Some("19L"),
            22000,
            60,
        ),
        (
            "Tabletop Dispenser",
            "Manual pump dispenser for 19L gallons",
            "dispenser",
            None,
            95000,
            15,
        ),
        (
            "Bottle Brush",
            "Cleaning brush for reusable bottles",
            "accessory",
            None,
            12000,
            80,
        ),
    ];

    for (name, desc, category, size, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, category, size, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(category)
        .bind(size)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
