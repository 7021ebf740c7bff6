//! Client side of the realtime todo list: the gateway seam, the list
//! reconciliation rules and the controller that ties them together.

pub mod controller;
pub mod gateway;
pub mod list;
pub mod rest;

pub use controller::{ControllerError, TodoController, TodoSnapshot};
pub use gateway::{ChangeHandler, DeliveryGate, GatewayError, Subscription, TodoGateway};
pub use list::{Merge, TodoList};
pub use rest::RestGateway;
