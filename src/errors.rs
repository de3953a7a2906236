// Create the Error, ErrorKind, ResultExt, and Result types
error_chain! {
    types {
        Error, ErrorKind, ResultExt;
    }
    foreign_links {
        Io(::std::io::Error);
        Cbor(::serde_cbor::error::Error);
        Timer(::tokio_timer::TimerError);
    }

    errors {
        InvalidMessage(reason: String) {
            description("invalid message from worker")
            display("invalid message from worker: {}", reason)
        }
    }
}

// Explicit alias just to make the IDEs happier
pub type Result<T> = ::std::result::Result<T, Error>;
