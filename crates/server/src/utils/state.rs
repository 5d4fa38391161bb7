use plastmem_core::Engine;

#[derive(Clone)]
pub struct AppState {
  pub engine: Engine,
}

impl AppState {
  #[must_use]
  pub const fn new(engine: Engine) -> Self {
    Self { engine }
  }
}
