use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Redirect,
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use bytes::Bytes;
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordForm, FormView, LoginForm, MessageResponse, PublicUser,
            RegisterForm, ResetPasswordForm,
        },
        guards::{AuthUser, RequireAnonymous},
        services,
    },
    error::AuthError,
    session::SESSION_COOKIE,
    state::AppState,
    uploads,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", get(forgot_password_form).post(forgot_password))
        .route(
            "/resetPassword/:token",
            get(reset_password_form).post(reset_password),
        )
        // Registration multipart carries at most a 1 MB image plus fields.
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/:username", get(user_profile))
}

#[instrument(skip_all)]
async fn index(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session bound to missing user {user_id}"))?;
    Ok(Json(user.into()))
}

async fn register_form(_guard: RequireAnonymous) -> Json<FormView> {
    Json(FormView {
        form: "register",
        token: None,
    })
}

async fn login_form(_guard: RequireAnonymous) -> Json<FormView> {
    Json(FormView {
        form: "login",
        token: None,
    })
}

async fn forgot_password_form(_guard: RequireAnonymous) -> Json<FormView> {
    Json(FormView {
        form: "forgotPassword",
        token: None,
    })
}

async fn reset_password_form(
    _guard: RequireAnonymous,
    Path(token): Path<String>,
) -> Json<FormView> {
    Json(FormView {
        form: "resetPassword",
        token: Some(token),
    })
}

struct UploadedFile {
    filename: String,
    content_type: String,
    body: Bytes,
}

/// Pulls the registration fields and the optional `profileImg` file out of
/// the multipart body.
async fn read_register_multipart(
    mut multipart: Multipart,
) -> Result<(RegisterForm, Option<UploadedFile>), AuthError> {
    let mut form = RegisterForm::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AuthError::UploadRejected(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "profileImg" {
            let filename = field.file_name().unwrap_or_default().to_string();
            if filename.is_empty() {
                // Empty file input submitted with the form.
                continue;
            }
            let content_type = field.content_type().unwrap_or_default().to_string();
            let body = field
                .bytes()
                .await
                .map_err(|e| AuthError::UploadRejected(e.to_string()))?;
            image = Some(UploadedFile {
                filename,
                content_type,
                body,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AuthError::UploadRejected(e.to_string()))?;
        match name.as_str() {
            "name" => form.name = value,
            "username" => form.username = value,
            "email" => form.email = value,
            "password" => form.password = value,
            "password2" => form.password2 = value,
            other => warn!(field = %other, "ignoring unknown register field"),
        }
    }

    Ok((form, image))
}

#[instrument(skip_all)]
async fn register(
    State(state): State<AppState>,
    _guard: RequireAnonymous,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let (form, image) = read_register_multipart(multipart).await?;

    let stored_image = match image {
        Some(file) => Some(
            uploads::store_profile_image(
                state.storage.as_ref(),
                &file.filename,
                &file.content_type,
                file.body,
            )
            .await?,
        ),
        None => None,
    };

    let user = match services::register(&state, form, stored_image.clone()).await {
        Ok(user) => user,
        Err(e) => {
            // The user record was never written; drop the orphaned upload.
            if let Some(filename) = &stored_image {
                if let Err(cleanup) = state.storage.delete_object(filename).await {
                    error!(error = %cleanup, filename = %filename, "orphaned upload cleanup failed");
                }
            }
            return Err(e);
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "You are registered and can login".to_string(),
            user: user.into(),
        }),
    ))
}

fn session_cookie(session_id: uuid::Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[instrument(skip_all)]
async fn login(
    State(state): State<AppState>,
    _guard: RequireAnonymous,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let user = services::login(&state, &form).await?;
    let session_id = state.sessions.insert(user.id).await;
    Ok((
        jar.add(session_cookie(session_id)),
        Json(AuthResponse {
            message: "Logged in".to_string(),
            user: user.into(),
        }),
    ))
}

#[instrument(skip_all)]
async fn logout(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(session_id) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| c.value().parse::<uuid::Uuid>().ok())
    {
        state.sessions.remove(session_id).await;
    }
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(removal), Redirect::to("/login?notice=logged_out"))
}

#[instrument(skip_all)]
async fn forgot_password(
    State(state): State<AppState>,
    _guard: RequireAnonymous,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Json<MessageResponse>, AuthError> {
    let sent = services::forgot_password(&state, &form.email).await?;
    let message = if sent {
        "Email sent to your email id"
    } else {
        "Could not send email, please try again"
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

#[instrument(skip_all)]
async fn reset_password(
    State(state): State<AppState>,
    _guard: RequireAnonymous,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Redirect, AuthError> {
    services::reset_password(&state, &token, &form).await?;
    Ok(Redirect::to("/login?notice=password_changed"))
}

#[instrument(skip_all, fields(username = %username))]
async fn user_profile(
    State(state): State<AppState>,
    AuthUser(_viewer): AuthUser,
    Path(username): Path<String>,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or(AuthError::NotFound("User not found"))?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use crate::{app::build_app, auth::dto::RegisterForm, auth::services, state::AppState};

    fn app() -> (Router, AppState) {
        let state = AppState::fake();
        (build_app(state.clone()), state)
    }

    async fn register_alice(state: &AppState) {
        services::register(
            state,
            RegisterForm {
                name: "Alice Smith".into(),
                username: "alice".into(),
                email: "alice@x.com".into(),
                password: "Abcdef1!".into(),
                password2: "Abcdef1!".into(),
            },
            None,
        )
        .await
        .expect("register alice");
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_bytes(res: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(res.into_body(), 1024 * 1024)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn index_redirects_unauthenticated_to_login() {
        let (app, _) = app();
        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(res.status().is_redirection());
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/login?notice=not_authorized"
        );
    }

    #[tokio::test]
    async fn login_form_is_open_to_anonymous_visitors() {
        let (app, _) = app();
        let res = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_bytes(res).await;
        assert!(String::from_utf8(body).unwrap().contains("login"));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (app, state) = app();
        register_alice(&state).await;

        let unknown = app
            .clone()
            .oneshot(form_request("/login", "username=nobody&password=Abcdef1%21"))
            .await
            .unwrap();
        let wrong = app
            .oneshot(form_request("/login", "username=alice&password=Wrong99%21"))
            .await
            .unwrap();

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_bytes(unknown).await, body_bytes(wrong).await);
    }

    #[tokio::test]
    async fn login_session_cookie_unlocks_guarded_routes() {
        let (app, state) = app();
        register_alice(&state).await;

        let res = app
            .clone()
            .oneshot(form_request("/login", "username=alice&password=Abcdef1%21"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie set")
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(body_bytes(res).await).unwrap();
        assert!(body.contains("alice"));

        // Anonymous-only routes now bounce the visitor.
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(res.status().is_redirection());

        // Logout drops the session.
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/logout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(res.status().is_redirection());

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(res.status().is_redirection());
    }

    fn multipart_register_body(boundary: &str, with_image: bool) -> String {
        let mut body = String::new();
        for (name, value) in [
            ("name", "Alice Smith"),
            ("username", "alice"),
            ("email", "alice@x.com"),
            ("password", "Abcdef1!"),
            ("password2", "Abcdef1!"),
        ] {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if with_image {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"profileImg\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\nfake-png-bytes\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        body
    }

    #[tokio::test]
    async fn register_multipart_creates_user_with_profile_image() {
        let (app, state) = app();
        let boundary = "XAUTHGATEBOUNDARY";
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(multipart_register_body(boundary, true)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let user = state
            .users
            .find_by_username("alice")
            .await
            .unwrap()
            .expect("user created");
        let image = user.profile_image.expect("image attached");
        assert!(image.starts_with("profileImg-"));
        assert!(image.ends_with(".png"));
    }

    #[tokio::test]
    async fn register_with_bad_image_type_is_rejected_without_user() {
        let (app, state) = app();
        let boundary = "XAUTHGATEBOUNDARY";
        let mut body = String::new();
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"profileImg\"; filename=\"evil.exe\"\r\nContent-Type: application/octet-stream\r\n\r\nMZ\r\n--{boundary}--\r\n"
        ));
        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.users.find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_validation_errors_are_field_keyed() {
        let (app, _) = app();
        let boundary = "XAUTHGATEBOUNDARY";
        let mut body = String::new();
        for (name, value) in [
            ("name", "A1"),
            ("username", "a!"),
            ("email", "nope"),
            ("password", "weak"),
            ("password2", "other"),
        ] {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));

        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes(res).await).unwrap();
        let errors = json.get("errors").expect("errors object");
        for field in ["name", "username", "email", "password", "password2"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
    }

    #[tokio::test]
    async fn reset_flow_over_http() {
        let (app, state) = app();
        register_alice(&state).await;

        let res = app
            .clone()
            .oneshot(form_request("/forgotPassword", "email=alice%40x.com"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let token = state
            .users
            .find_by_email("alice@x.com")
            .await
            .unwrap()
            .unwrap()
            .reset_token
            .expect("token issued");

        let res = app
            .clone()
            .oneshot(form_request(
                &format!("/resetPassword/{token}"),
                "password=Ghijkl2%21&password2=Ghijkl2%21",
            ))
            .await
            .unwrap();
        assert!(res.status().is_redirection());
        assert_eq!(
            res.headers().get(header::LOCATION).unwrap(),
            "/login?notice=password_changed"
        );

        // Replaying the consumed token restarts the forgot-password flow.
        let res = app
            .clone()
            .oneshot(form_request(
                &format!("/resetPassword/{token}"),
                "password=Mnopqr3%21&password2=Mnopqr3%21",
            ))
            .await
            .unwrap();
        assert!(res.status().is_redirection());
        let location = res
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.starts_with("/forgotPassword"));

        // New password works, old one does not.
        let res = app
            .clone()
            .oneshot(form_request("/login", "username=alice&password=Ghijkl2%21"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let res = app
            .oneshot(form_request("/login", "username=alice&password=Abcdef1%21"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
