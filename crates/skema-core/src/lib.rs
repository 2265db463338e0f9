pub mod container;
pub mod expr;
pub mod geometry;
pub mod history;
pub mod id;
pub mod model;
pub mod storage;
pub mod templater;

pub use container::{ClosestPointToItem, DragEdge, Dragger, Element, SchemeContainer};
pub use geometry::{Area, AreaKind, Outline, Point, ScreenTransform, Snapper, Transform};
pub use history::History;
pub use id::ItemId;
pub use model::*;
pub use storage::{InMemoryStorage, SchemeStorage};
pub use templater::{generate_items, preserve_native_children, process_json_template};
