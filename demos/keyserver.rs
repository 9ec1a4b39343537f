//! Key-generation demo API.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example keyserver
//!
//! Try:
//!   curl http://localhost:3000/v1
//!   curl http://localhost:3000/v1/generate/sha256
//!   curl http://localhost:3000/v1/generate/sha512/somerandomsalt

use blubber::{
    App, Context, HookArgs, HookInput, HookReply, HttpError, Options, Params, Response, Server,
    Status,
};
use serde_json::{Value, json};
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = App::new(["v1"], Options { require_https: false, ..Options::default() });

    // The route handler stays thin; key generation is a named event so the
    // scheme can be swapped without touching the route.
    app.on("generate.key", |input: HookInput| async move {
        let request_id = input.request()?.request_id().to_owned();
        let params = input.args().value().cloned().unwrap_or(Value::Null);
        let algo = params.get("user_algo").and_then(Value::as_str).unwrap_or_default();
        let salt = params.get("user_salt").and_then(Value::as_str).unwrap_or_default();

        let seed = format!("{}{salt}{request_id}", Uuid::new_v4());
        let key = match algo {
            "sha256" => hex::encode(Sha256::digest(seed.as_bytes())),
            "sha512" => hex::encode(Sha512::digest(seed.as_bytes())),
            other => {
                return Err(HttpError::new(
                    Status::BadRequest,
                    format!("Supplied algorithm ({other}) is not valid"),
                ));
            }
        };
        Ok(HookReply::Value(Value::String(key)))
    });

    app.route("/", |r| {
        r.get(usage);
    });

    // /v1/generate/sha256/somerandomsalt
    app.route("/generate/!user_algo/*user_salt", |r| {
        r.name("generate");
        r.get(generate);
    });

    Server::bind("0.0.0.0:3000").serve(app).await.expect("server error");
}

async fn usage(_ctx: Context, mut res: Response, _params: Params) -> Result<Response, HttpError> {
    res.write(Status::Ok, json!({ "usage": "/v1/generate/{hash_algo}/{hash_salt}" }));
    Ok(res)
}

async fn generate(ctx: Context, mut res: Response, params: Params) -> Result<Response, HttpError> {
    let reply = ctx.dispatch("generate.key", HookArgs::Value(params.to_value())).await?;
    let key = match reply {
        Some(HookReply::Value(value)) => value,
        _ => Value::Null,
    };
    res.write(Status::Ok, json!({ "keygen": key }));
    Ok(res)
}
