macro_rules! invalid_data {
    ($e:expr) => {
        return Err(::std::io::Error::new(::std::io::ErrorKind::InvalidData, $e))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidData,
            format!($fmt, $($arg)+),
        ))
    };
}

macro_rules! invalid_descriptor {
    ($index:expr, $e:expr) => {
        return Err($crate::Error::InvalidDescriptor {
            index: $index,
            reason: ($e).to_string(),
        })
    };
    ($index:expr, $fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::InvalidDescriptor {
            index: $index,
            reason: format!($fmt, $($arg)+),
        })
    };
}
