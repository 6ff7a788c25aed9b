/// The sequential counterpart of a concurrent operation: takes the model state and the
/// operation's argument, returns the next state and the operation's result.
pub type SequentialOp<Seq, Ret> = fn(&Seq, Option<Ret>) -> (Seq, Option<Ret>);

pub struct TimeStamped<Seq, Ret> {
    pub stamp: u64,
    pub event: Event<Seq, Ret>,
}

impl<Seq, Ret> TimeStamped<Seq, Ret> {
    pub fn new_invoke(
        stamp: u64,
        id: usize,
        message: String,
        op: SequentialOp<Seq, Ret>,
        arg: Option<Ret>,
    ) -> Self {
        Self {
            stamp,
            event: Event::Invoke(InvokeEvent {
                id,
                message,
                op,
                arg,
            }),
        }
    }

    pub fn new_return(stamp: u64, id: usize, result: Option<Ret>) -> Self {
        Self {
            stamp,
            event: Event::Return(ReturnEvent { id, result }),
        }
    }
}

pub enum Event<Seq, Ret> {
    Invoke(InvokeEvent<Seq, Ret>),
    Return(ReturnEvent<Ret>),
}

pub struct InvokeEvent<Seq, Ret> {
    pub id: usize,
    pub message: String,
    pub op: SequentialOp<Seq, Ret>,
    pub arg: Option<Ret>,
}

pub struct ReturnEvent<Ret> {
    pub id: usize,
    pub result: Option<Ret>,
}
