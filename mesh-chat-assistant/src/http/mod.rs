//! C10 — the HTTP surface (ambient; see SPEC_FULL.md §2, C10).

mod handlers;
mod routes;
mod state;

pub use routes::router;
pub use state::AppState;
