//! Minimal waypost example: a users controller with an injected repository,
//! an auth middleware and a validator.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/1
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -H 'authorization: Bearer demo' \
//!        -d '{"name":"alice","email":"alice@example.com","admin":true}'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer demo' \
//!        -d 'name=bob'

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use waypost::{
    App, BodyFilter, Container, Controller, Dependencies, Error, Injectable, LogTracer, Middleware,
    MiddlewareRef, Request, RequestError, Required, Route, Server,
};

// ── Repository ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct UserRepository {
    users: Mutex<Vec<Value>>,
}

impl UserRepository {
    fn find(&self, id: u64) -> Option<Value> {
        self.users.lock().iter().find(|u| u["id"] == json!(id)).cloned()
    }

    fn insert(&self, name: String, email: String) -> Value {
        let mut users = self.users.lock();
        let user = json!({ "id": users.len() + 1, "name": name, "email": email });
        users.push(user.clone());
        user
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

struct BearerAuth;

#[async_trait]
impl Middleware for BearerAuth {
    async fn execute(&self, req: &Request) -> Result<Map<String, Value>, RequestError> {
        let token = req.header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| RequestError::domain(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        let mut context = Map::new();
        context.insert("auth".to_owned(), json!({ "token": token }));
        Ok(context)
    }

    fn name(&self) -> &str { "bearer-auth" }
}

// ── Controller ────────────────────────────────────────────────────────────────

struct Users {
    repo: Arc<UserRepository>,
}

impl Injectable for Users {
    const DEPENDENCIES: &'static [&'static str] = &["UserRepository"];

    fn construct(mut deps: Dependencies<'_>) -> Result<Self, Error> {
        Ok(Self { repo: deps.next()? })
    }
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

impl Users {
    // GET /users/:id
    async fn show(self: Arc<Self>, req: Request) -> Result<Value, RequestError> {
        let id = req.get("id").and_then(Value::as_u64).unwrap_or(0);
        self.repo
            .find(id)
            .ok_or_else(|| RequestError::domain(StatusCode::NOT_FOUND, format!("user {id} not found")))
    }

    // POST /users → 201
    //
    // Only the declared body fields reach the handler; `admin` is dropped.
    async fn create(self: Arc<Self>, req: Request) -> Result<Value, RequestError> {
        let input: NewUser = req.parse()?;
        Ok(self.repo.insert(input.name, input.email))
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let container = Container::new();
    container.register("UserRepository", UserRepository::default());

    let app = App::builder(container)
        .controller(
            Controller::new("/users")
                .tracer(LogTracer)
                .route(Route::get("/:id", Users::show).params(["id|integer"]))
                .route(
                    Route::post("/", Users::create)
                        .status(StatusCode::CREATED)
                        .body(["name|string", "email|string"])
                        .body_filter(BodyFilter::Restrict)
                        .validator(Required::fields(["name", "email"]))
                        .middleware(MiddlewareRef::instance(BearerAuth)),
                ),
        )
        .build()?;

    Server::bind("0.0.0.0:3000")?.serve(app).await
}
