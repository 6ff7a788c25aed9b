pub use self::hashtable::{ConcurrentHashtable, DEFAULT_BUCKET_COUNT};
pub use self::list::ConcurrentList;
pub use self::queue::ConcurrentQueue;
pub use self::stack::LockFreeStack;

mod hashtable;
mod list;
mod queue;
mod stack;
