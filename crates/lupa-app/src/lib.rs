// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod classify;
pub mod format;
pub mod ids;
pub mod model;
pub mod state;
pub mod template;

pub use classify::*;
pub use format::*;
pub use ids::*;
pub use model::*;
pub use state::*;
pub use template::*;
