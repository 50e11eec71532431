pub mod gpu;
pub mod merge;
pub mod object_cache;
pub mod resource_cache;
pub mod scheduler;
pub mod state;

pub use gpu::{BufferId, GpuDevice, GpuResource, HeadlessDevice, SamplerId, TextureId};
pub use merge::{Collision, MergeDefault, MergePolicy, MergeReport, Resolution};
pub use object_cache::{AttachedObject, ObjectCache};
pub use resource_cache::{CacheKey, ResourceCache};
pub use scheduler::{DrainReport, GpuInitScheduler};
pub use state::{GpuStatus, ResourceState};
