pub mod geo;
pub mod transition;
pub mod types;

pub use geo::{haversine_km, rank_nearby, BoundingBox, Located, NearbyQuery};
pub use transition::{
    action_for_status, plan, Actor, HelperChange, TaskAction, TaskRef, Transition,
    TransitionError,
};
pub use types::{
    GeoPoint, PublicUser, Task, TaskDetail, TaskParty, TaskStatus, User, UserRole, UserStatus,
};
