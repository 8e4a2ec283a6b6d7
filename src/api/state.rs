//! Shared state handed to every API handler

use std::sync::Arc;

use crate::hub::Hub;

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<Hub>,
}

impl ApiState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}
