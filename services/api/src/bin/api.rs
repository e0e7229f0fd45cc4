//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, mpesa::MpesaClient, paystack::PaystackClient},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        courses::{
            archive_course_handler, create_course_handler, create_lesson_handler,
            create_module_handler, create_section_handler, get_course_handler,
            list_courses_handler, list_lessons_handler, list_modules_handler,
            list_sections_handler, list_trainer_courses_handler, publish_course_handler,
        },
        discussions::{
            create_message_handler, create_thread_handler, list_messages_handler,
            list_threads_handler, update_message_handler,
        },
        enrollments::{enroll_handler, list_enrollments_handler},
        invites::{accept_invite_handler, create_invite_handler, list_invites_handler},
        middleware::require_auth,
        payments::{
            mpesa_callback_handler, mpesa_initiate_handler, mpesa_status_handler,
            paystack_initialize_handler, paystack_verify_handler, paystack_webhook_handler,
        },
        progress::{complete_section_handler, course_progress_handler},
        rest::{dashboard_handler, ApiDoc},
        state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;

/// How many stuck payments each reconcile pass picks up.
const RECONCILE_BATCH: usize = 100;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Payment Gateways ---
    let card_gateway = Arc::new(PaystackClient::new(
        config.paystack_secret_key.clone(),
        config.paystack_base_url.clone(),
    ));
    let mobile_gateway = Arc::new(MpesaClient::new(
        config.mpesa_base_url.clone(),
        config.mpesa_consumer_key.clone(),
        config.mpesa_consumer_secret.clone(),
        config.mpesa_shortcode.clone(),
        config.mpesa_passkey.clone(),
        config.mpesa_callback_url.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        db_adapter,
        config.clone(),
        card_gateway,
        mobile_gateway,
    ));

    // --- 5. Start the Settlement Reconciler ---
    // Picks up payments that were recorded but never granted, e.g. after
    // a crash between the insert and the enrollment write.
    {
        let settlement = app_state.settlement.clone();
        let period = Duration::from_secs(config.reconcile_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match settlement.reconcile(RECONCILE_BATCH).await {
                    Ok(report) if report.settled > 0 || report.failed > 0 => {
                        info!(
                            settled = report.settled,
                            failed = report.failed,
                            "reconciled stuck payments"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("payment reconciliation failed: {e}"),
                }
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required): signup/login, the published
    // catalog, and the provider callbacks, which authenticate themselves.
    let public_routes = Router::new()
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/courses", get(list_courses_handler))
        .route("/api/courses/{course_id}", get(get_course_handler))
        .route("/api/paystack/webhook", post(paystack_webhook_handler))
        .route("/api/mpesa/callback", post(mpesa_callback_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/trainer/courses",
            get(list_trainer_courses_handler).post(create_course_handler),
        )
        .route("/api/courses/{course_id}/publish", post(publish_course_handler))
        .route("/api/courses/{course_id}/archive", post(archive_course_handler))
        .route(
            "/api/courses/{course_id}/lessons",
            get(list_lessons_handler).post(create_lesson_handler),
        )
        .route(
            "/api/lessons/{lesson_id}/modules",
            get(list_modules_handler).post(create_module_handler),
        )
        .route(
            "/api/modules/{module_id}/sections",
            get(list_sections_handler).post(create_section_handler),
        )
        .route("/api/sections/{section_id}/complete", post(complete_section_handler))
        .route("/api/courses/{course_id}/progress", get(course_progress_handler))
        .route("/api/courses/{course_id}/enroll", post(enroll_handler))
        .route("/api/enrollments", get(list_enrollments_handler))
        .route("/api/paystack/initialize", post(paystack_initialize_handler))
        .route("/api/paystack/verify/{reference}", get(paystack_verify_handler))
        .route("/api/mpesa/initiate", post(mpesa_initiate_handler))
        .route(
            "/api/mpesa/status/{checkout_request_id}",
            get(mpesa_status_handler),
        )
        .route(
            "/api/courses/{course_id}/invites",
            get(list_invites_handler).post(create_invite_handler),
        )
        .route("/api/invites/accept", post(accept_invite_handler))
        .route(
            "/api/courses/{course_id}/threads",
            get(list_threads_handler).post(create_thread_handler),
        )
        .route(
            "/api/threads/{thread_id}/messages",
            get(list_messages_handler).post(create_message_handler),
        )
        .route("/api/messages/{message_id}", patch(update_message_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Swagger UI rides alongside the API routes.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
