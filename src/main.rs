use axum::Router;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use time::Duration;
use tokio::net::TcpListener;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

mod answer;
mod auth;
mod dashboard;
mod error;
mod grade;
mod model;
mod quiz;
mod schema;
#[cfg(test)]
mod test_util;
mod utils;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[tokio::main]
async fn main() {
    // Database configuration
    dotenv::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://quizbank.db".into());

    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .expect("Failed to create DB pool");

    // Sessions configuration
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_secure(false);

    // Answer-sheet routes: star/grade/review all live under /answers
    let answers_router = answer::star_router(pool.clone()).merge(grade::router(pool.clone()));

    let api_router = Router::new()
        .nest("/quizzes", quiz::router(pool.clone()))
        .nest("/problems", answer::save_router(pool.clone()))
        .nest("/answers", answers_router)
        .nest("/dashboard", dashboard::router(pool.clone()))
        .nest("/auth", auth::router(pool.clone()));

    let app = Router::new().nest("/api", api_router).layer(session_layer);

    // Start server
    let listener = match TcpListener::bind("127.0.0.1:5000").await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to address: {}", e);
            std::process::exit(1);
        }
    };

    println!("Server running on http://localhost:5000");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
