pub mod config;
pub mod cookies;
pub mod db;
pub mod error;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod tasks;

pub mod crypto {
    pub mod aes;
    pub mod envelope;
    pub mod password;
    pub mod random;
    pub mod sealed;
    pub mod secret_store;
}

pub mod tokens {
    pub mod bind;
    pub mod revocation;
    pub mod session;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod csrf;
    pub mod user;
}

pub mod services {
    pub mod auth;
}

pub mod handlers {
    pub mod auth;
    pub mod session;
    pub mod single_use;
    pub mod status;
    pub mod tokens;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod bind;
    pub mod csrf;
    pub mod nonce;
    pub mod rate_limit;
    pub mod resource;
    pub mod silent_errors;
    pub mod uri_guard;
}

pub mod validation {
    pub mod auth;
}
