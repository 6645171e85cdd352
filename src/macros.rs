pub use enclose::*;

/// `computed!(rt, (a, b) cx => a.get(cx) + b.get(cx))`
#[macro_export]
macro_rules! computed {
    ($rt:expr, ( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
        $rt.computed($crate::macros::enclose!(($( $d_tt )*) move |$ctx: &$crate::Evaluation| { $($b)* }))
    };
    ($rt:expr, $ctx:ident => $($b:tt)*) => {
        $rt.computed(move |$ctx: &$crate::Evaluation| { $($b)* })
    };
}

/// `autorun!(rt, (list) cx => { ...; Ok(()) })`
#[macro_export]
macro_rules! autorun {
    ($rt:expr, ( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
        $rt.autorun($crate::macros::enclose!(($( $d_tt )*) move |$ctx: &$crate::Evaluation| { $($b)* }))
    };
    ($rt:expr, $ctx:ident => $($b:tt)*) => {
        $rt.autorun(move |$ctx: &$crate::Evaluation| { $($b)* })
    };
}

/// `batch!(rt, "name", (list) => { list.push(1)?; Ok(()) })`
#[macro_export]
macro_rules! batch {
    ($rt:expr, $name:expr, ( $($d_tt:tt)* ) => $($b:tt)*) => {
        $rt.run_in_batch($name, $crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($rt:expr, $name:expr, => $($b:tt)*) => {
        $rt.run_in_batch($name, move || { $($b)* })
    };
}
