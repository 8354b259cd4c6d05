pub(crate) mod common;
mod in_memory;
mod local_fs;
mod swift;

pub use common::{BoxedCopier, ContentCopier, Copier, USER_AGENT};
pub use in_memory::InMemoryCopier;
pub use local_fs::LocalFsCopier;
pub use swift::{AuthVersion, SwiftConfig, SwiftCopier};
