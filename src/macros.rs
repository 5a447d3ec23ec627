//! Address literal macros.
//!
//! Both macros check their components at compile time and expand to a
//! `const` address.

/// Creates a [`GroupAddress`](crate::addressing::GroupAddress) from 3-level notation.
///
/// # Syntax
///
/// ```text
/// ga!(main/middle/sub)
/// ```
///
/// Where:
/// - `main`: Main group (0-31)
/// - `middle`: Middle group (0-7)
/// - `sub`: Sub group (0-255)
///
/// # Examples
///
/// ```
/// use knx_tunnel::ga;
/// use knx_tunnel::addressing::GroupAddress;
///
/// let light_switch = ga!(1/2/3);
/// assert_eq!(light_switch, GroupAddress::from_raw(0x0A03));
/// assert_eq!(light_switch.to_string(), "1/2/3");
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // main group > 31
/// let addr = knx_tunnel::ga!(32/0/0);
/// ```
///
/// ```compile_fail
/// // middle group > 7
/// let addr = knx_tunnel::ga!(1/8/0);
/// ```
#[macro_export]
macro_rules! ga {
    ($main:literal / $middle:literal / $sub:literal) => {{
        const _: () = {
            if $main > 31 {
                panic!("Main group must be 0-31");
            }
            if $middle > 7 {
                panic!("Middle group must be 0-7");
            }
            if $sub > 255 {
                panic!("Sub group must be 0-255");
            }
        };

        // MMMMMIII SSSSSSSS
        const RAW: u16 = (($main & 0x1F) << 11) | (($middle & 0x07) << 8) | ($sub & 0xFF);
        $crate::addressing::GroupAddress::with_raw(RAW, $crate::addressing::GroupAddressType::Long)
    }};
}

/// Creates an [`IndividualAddress`](crate::addressing::IndividualAddress) from
/// `area.line.device` notation.
///
/// # Examples
///
/// ```
/// use knx_tunnel::ia;
///
/// let gateway = ia!(1.1.255);
/// assert_eq!(gateway.raw(), 0x11FF);
/// assert!(gateway.is_device());
/// ```
///
/// ```compile_fail
/// // area > 15
/// let addr = knx_tunnel::ia!(16.0.1);
/// ```
#[macro_export]
macro_rules! ia {
    ($($address:tt)+) => {{
        const ADDRESS: $crate::addressing::IndividualAddress =
            $crate::addressing::IndividualAddress::from_literal(stringify!($($address)+));
        ADDRESS
    }};
}
