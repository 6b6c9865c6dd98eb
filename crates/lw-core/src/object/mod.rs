//! Dynamic GUI-side object model
//!
//! GUI objects are shaped at runtime: properties come and go, methods are
//! looked up by name, and a prototype chain supplies inherited members. This
//! module expresses that with [`Prop`] values and reference-counted
//! [`GuiObject`]s.

mod dispose;
mod gui;
mod prop;

pub use dispose::{Disposable, DisposeSignal, Subscription};
pub use gui::{GuiObject, GuiObjectBuilder, ObjectKey, ObjectRef};
pub use prop::{Method, MethodFuture, Prop};
