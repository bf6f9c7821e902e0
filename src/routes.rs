use crate::{
    api::{attendance, member, report, workout},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Per-route limiter allowing `requests_per_min` per client IP.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();

    Governor::new(&cfg)
}

// Literal paths come before `/{id}` so `today` or `stats` never parse as an id.
pub fn attendance_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            // /attendance
            .service(web::resource("").route(web::get().to(attendance::list_attendance)))
            .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
            .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
            .service(web::resource("/today").route(web::get().to(attendance::today)))
            .service(web::resource("/me").route(web::get().to(attendance::my_attendance)))
            .service(web::resource("/stats").route(web::get().to(attendance::stats)))
            .service(
                web::resource("/stats/{member_id}").route(web::get().to(attendance::member_stats)),
            )
            // /attendance/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(attendance::get_attendance))
                    .route(web::delete().to(attendance::delete_attendance)),
            ),
    );
}

pub fn member_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/members")
            // /members
            .service(
                web::resource("")
                    .route(web::post().to(member::create_member))
                    .route(web::get().to(member::list_members)),
            )
            // /members/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(member::get_member))
                    .route(web::put().to(member::update_member))
                    .route(web::delete().to(member::delete_member)),
            )
            // /members/{id}/account
            .service(web::resource("/{id}/account").route(web::put().to(member::link_account))),
    );
}

// `/types` comes before `/{id}` for the same reason as the attendance routes.
pub fn workout_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/workouts")
            // /workouts
            .service(
                web::resource("")
                    .route(web::post().to(workout::create_workout))
                    .route(web::get().to(workout::list_workouts)),
            )
            .service(web::resource("/types").route(web::get().to(workout::workout_types)))
            // /workouts/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(workout::get_workout))
                    .route(web::put().to(workout::update_workout))
                    .route(web::delete().to(workout::delete_workout)),
            ),
    );
}

pub fn report_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reports")
            .service(web::resource("/attendance").route(web::get().to(report::attendance_report)))
            .service(web::resource("/summary").route(web::get().to(report::summary)))
            .service(web::resource("/membership").route(web::get().to(report::membership)))
            .service(
                web::resource("/attendance-frequency")
                    .route(web::get().to(report::attendance_frequency)),
            ),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Governor is not Clone; /login and /logout share one limiter through the Arc.
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .configure(attendance_routes)
            .configure(member_routes)
            .configure(workout_routes)
            .configure(report_routes),
    );
}

// LOGIN
//  ├─ access_token (ACCESS_TOKEN_TTL)
//  └─ refresh_token (REFRESH_TOKEN_TTL, jti stored, single use)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ revokes it, returns a new pair

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::lazy_pool;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::json;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40_000))
    }

    #[actix_web::test]
    async fn configured_app_serves_public_and_protected_scopes() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(lazy_pool()))
                .configure(|cfg| configure(cfg, &config)),
        )
        .await;

        // Both requests pass through the shared login limiter.
        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/auth/login")
                .peer_addr(peer())
                .set_json(json!({ "username": "", "password": "" }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        }

        for uri in ["/api/attendance/today", "/api/workouts/types", "/api/reports/membership"] {
            let req = test::TestRequest::get().uri(uri).peer_addr(peer()).to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::UNAUTHORIZED,
                "{uri}"
            );
        }
    }
}
