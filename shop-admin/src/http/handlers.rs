use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::HeaderName;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::OffsetDateTime;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::accounts::{AdminForm, AdminView, Credentials};
use crate::collections::{validate_collection_form, Collection, CollectionForm};
use crate::products::{validate_product_form, Product, ProductForm};
use crate::users::{validate_user_form, PasswordRule, User, UserForm};

use super::auth::{authenticated, Identity, TOKEN_COOKIE};
use super::error::ApiError;
use super::responses::{
    DataResponse, HealthResponse, IdentityResponse, JwtResponse, Pagination, PaginationQuery,
};
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route(
            "/api/collections",
            get(list_collections).post(create_collection),
        )
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticated));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .merge(gated)
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid::default(),
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<AdminForm>, JsonRejection>,
) -> Result<Json<DataResponse<AdminView>>, ApiError> {
    let Json(form) = payload.map_err(|rejection| {
        debug!(error = %rejection, "undecodable sign-up body");
        ApiError::BadRequest("Invalid form")
    })?;

    let admin = state.accounts.register(form).await?;
    Ok(Json(DataResponse::new(200, "Success", admin)))
}

async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(CookieJar, Json<JwtResponse>), ApiError> {
    let Json(creds) = payload.map_err(|rejection| {
        debug!(error = %rejection, "undecodable sign-in body");
        ApiError::BadRequest("Invalid request body")
    })?;

    let signed_in = state.accounts.sign_in(creds).await?;
    let expires = OffsetDateTime::from_unix_timestamp(signed_in.token.expires_at.timestamp())
        .map_err(|e| {
            error!(error = %e, "token expiry is not a valid cookie date");
            ApiError::Internal
        })?;

    let cookie = Cookie::build((TOKEN_COOKIE, signed_in.token.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .expires(expires);

    Ok((
        jar.add(cookie),
        Json(JwtResponse {
            token: signed_in.token.token,
            expires_at: signed_in.token.expires_at,
            admin: signed_in.admin,
        }),
    ))
}

async fn me(identity: Identity) -> Result<Json<DataResponse<IdentityResponse>>, ApiError> {
    let username = identity.require_admin()?;
    Ok(Json(DataResponse::new(
        200,
        "OK",
        IdentityResponse {
            username: username.to_string(),
        },
    )))
}

async fn list_products(
    State(state): State<AppState>,
    identity: Identity,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> Result<Json<DataResponse<Vec<Product>>>, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::BadRequest("Invalid query params"))?;
    let (limit, page) = query.resolve();

    let (products, total) = state.products.list(limit, page).await?;
    debug!(
        limit,
        page,
        results = products.len(),
        admin = identity.username().unwrap_or("-"),
        "products listed"
    );

    Ok(Json(
        DataResponse::new(200, "OK", products).with_pagination(Pagination { total, limit, page }),
    ))
}

async fn create_product(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<ProductForm>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Product>>), ApiError> {
    let username = identity.require_admin()?;
    let Json(form) = payload.map_err(|_| ApiError::BadRequest("Invalid form"))?;
    validate_product_form(&form).map_err(ApiError::Validation)?;

    let product = state.products.insert(&form, username).await?;
    debug!(id = product.id, admin = %username, "product created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(201, "Created", product)),
    ))
}

fn record_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    let Path(id) = path.map_err(|_| ApiError::BadRequest("Invalid Id"))?;
    Ok(id)
}

async fn get_product(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<Product>>, ApiError> {
    let id = record_id(path)?;
    let product = state.products.find(id).await?;
    Ok(Json(DataResponse::new(200, "OK", product)))
}

async fn update_product(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ProductForm>, JsonRejection>,
) -> Result<Json<DataResponse<Product>>, ApiError> {
    let username = identity.require_admin()?;
    let id = record_id(path)?;
    let Json(form) = payload.map_err(|_| ApiError::BadRequest("Invalid form"))?;
    validate_product_form(&form).map_err(ApiError::Validation)?;

    let product = state.products.update(id, &form).await?;
    debug!(id, admin = %username, "product updated");
    Ok(Json(DataResponse::new(200, "OK", product)))
}

async fn delete_product(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<()>>, ApiError> {
    let username = identity.require_admin()?;
    let id = record_id(path)?;

    state.products.delete(id).await?;
    debug!(id, admin = %username, "product deleted");
    Ok(Json(DataResponse::new(200, "DELETED", ())))
}

async fn list_collections(
    State(state): State<AppState>,
    identity: Identity,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> Result<Json<DataResponse<Vec<Collection>>>, ApiError> {
    identity.require_admin()?;
    let Query(query) = query.map_err(|_| ApiError::BadRequest("Invalid query params"))?;
    let (limit, page) = query.resolve();

    let (collections, total) = state.collections.list(limit, page).await?;
    Ok(Json(
        DataResponse::new(200, "Success", collections)
            .with_pagination(Pagination { total, limit, page }),
    ))
}

async fn create_collection(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<CollectionForm>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Collection>>), ApiError> {
    let username = identity.require_admin()?;
    let Json(form) = payload.map_err(|_| ApiError::BadRequest("Invalid form"))?;
    validate_collection_form(&form).map_err(ApiError::Validation)?;

    let collection = state.collections.insert(&form, username).await?;
    debug!(id = collection.id, admin = %username, "collection created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(201, "Created", collection)),
    ))
}

async fn list_users(
    State(state): State<AppState>,
    identity: Identity,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> Result<Json<DataResponse<Vec<User>>>, ApiError> {
    identity.require_admin()?;
    let Query(query) = query.map_err(|_| ApiError::BadRequest("Invalid query params"))?;
    let (limit, page) = query.resolve();

    let (users, total) = state.users.list(limit, page).await?;
    Ok(Json(
        DataResponse::new(200, "OK", users).with_pagination(Pagination { total, limit, page }),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    identity.require_admin()?;
    let id = record_id(path)?;
    let user = state.users.find(id).await?;
    Ok(Json(DataResponse::new(200, "OK", user)))
}

async fn create_user(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<UserForm>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<User>>), ApiError> {
    let username = identity.require_admin()?;
    let Json(mut form) = payload.map_err(|_| ApiError::BadRequest("Invalid form"))?;
    validate_user_form(&form, PasswordRule::Required).map_err(ApiError::Validation)?;

    let password_hash = state
        .hasher
        .hash_blocking(std::mem::take(&mut form.password))
        .await?;
    let user = state.users.insert(&form, &password_hash).await?;
    debug!(id = user.id, admin = %username, "user created");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(201, "Created", user)),
    ))
}

async fn update_user(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UserForm>, JsonRejection>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    let username = identity.require_admin()?;
    let id = record_id(path)?;
    let Json(mut form) = payload.map_err(|_| ApiError::BadRequest("Invalid form"))?;
    validate_user_form(&form, PasswordRule::Optional).map_err(ApiError::Validation)?;

    let password_hash = match std::mem::take(&mut form.password) {
        password if password.is_empty() => None,
        password => Some(state.hasher.hash_blocking(password).await?),
    };
    let user = state
        .users
        .update(id, &form, password_hash.as_deref())
        .await?;
    debug!(id, admin = %username, "user updated");
    Ok(Json(DataResponse::new(200, "OK", user)))
}

async fn delete_user(
    State(state): State<AppState>,
    identity: Identity,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<()>>, ApiError> {
    let username = identity.require_admin()?;
    let id = record_id(path)?;

    state.users.delete(id).await?;
    debug!(id, admin = %username, "user deleted");
    Ok(Json(DataResponse::new(200, "DELETED", ())))
}
