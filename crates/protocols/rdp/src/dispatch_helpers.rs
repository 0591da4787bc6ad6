/// Late-bound property and method access on the RDP control.
///
/// Names are resolved with `GetIDsOfNames` on every call; the control is
/// only configured a handful of times per session.
use std::mem::ManuallyDrop;

use windows::core::{BSTR, GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{VARIANT_FALSE, VARIANT_TRUE};
use windows::Win32::System::Com::{
    IDispatch, DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::DISPID_PROPERTYPUT;
use windows::Win32::System::Variant::{VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_I4};

use crate::automation::OptionValue;

/// The name is not a member of the object.
pub const DISP_E_UNKNOWNNAME: HRESULT = HRESULT(0x8002_0006_u32 as i32);
/// The member exists but does not accept this kind of call.
pub const DISP_E_MEMBERNOTFOUND: HRESULT = HRESULT(0x8002_0003_u32 as i32);

const LOCALE_SYSTEM_DEFAULT: u32 = 0x0800;

pub unsafe fn get_dispid(dispatch: &IDispatch, name: &str) -> windows::core::Result<i32> {
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let names = [PCWSTR(wide.as_ptr())];
    let mut dispid = 0i32;
    dispatch.GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, LOCALE_SYSTEM_DEFAULT, &mut dispid)?;
    Ok(dispid)
}

fn bstr_variant(value: &str) -> VARIANT {
    let mut arg = VARIANT::default();
    unsafe {
        let inner = &mut *arg.Anonymous.Anonymous;
        inner.vt = VT_BSTR;
        inner.Anonymous.bstrVal = ManuallyDrop::new(BSTR::from(value));
    }
    arg
}

fn i32_variant(value: i32) -> VARIANT {
    let mut arg = VARIANT::default();
    unsafe {
        let inner = &mut *arg.Anonymous.Anonymous;
        inner.vt = VT_I4;
        inner.Anonymous.lVal = value;
    }
    arg
}

fn bool_variant(value: bool) -> VARIANT {
    let mut arg = VARIANT::default();
    unsafe {
        let inner = &mut *arg.Anonymous.Anonymous;
        inner.vt = VT_BOOL;
        inner.Anonymous.boolVal = if value { VARIANT_TRUE } else { VARIANT_FALSE };
    }
    arg
}

fn to_variant(value: &OptionValue) -> VARIANT {
    match value {
        OptionValue::Bool(value) => bool_variant(*value),
        OptionValue::Int(value) => i32_variant(*value),
        OptionValue::Str(value) => bstr_variant(value),
    }
}

unsafe fn put_variant(dispatch: &IDispatch, name: &str, mut arg: VARIANT) -> windows::core::Result<()> {
    let dispid = get_dispid(dispatch, name)?;
    let mut named_arg = DISPID_PROPERTYPUT;
    let params = DISPPARAMS {
        rgvarg: &mut arg,
        rgdispidNamedArgs: &mut named_arg,
        cArgs: 1,
        cNamedArgs: 1,
    };

    dispatch.Invoke(
        dispid,
        &GUID::zeroed(),
        LOCALE_SYSTEM_DEFAULT,
        DISPATCH_PROPERTYPUT,
        &params,
        None,
        None,
        None,
    )
}

pub unsafe fn put_bstr_property(dispatch: &IDispatch, name: &str, value: &str) -> windows::core::Result<()> {
    put_variant(dispatch, name, bstr_variant(value))
}

pub unsafe fn put_i32_property(dispatch: &IDispatch, name: &str, value: i32) -> windows::core::Result<()> {
    put_variant(dispatch, name, i32_variant(value))
}

pub unsafe fn put_bool_property(dispatch: &IDispatch, name: &str, value: bool) -> windows::core::Result<()> {
    put_variant(dispatch, name, bool_variant(value))
}

pub unsafe fn put_property(dispatch: &IDispatch, name: &str, value: &OptionValue) -> windows::core::Result<()> {
    put_variant(dispatch, name, to_variant(value))
}

/// Property put that reports "not applied" instead of failing.
///
/// Missing members are expected on older clients and only traced; any other
/// failure is logged at debug level.
pub unsafe fn try_put(dispatch: &IDispatch, name: &str, value: &OptionValue) -> bool {
    match put_property(dispatch, name, value) {
        Ok(()) => true,
        Err(error) if error.code() == DISP_E_UNKNOWNNAME || error.code() == DISP_E_MEMBERNOTFOUND => {
            tracing::trace!(name, "property not present on this control version");
            false
        }
        Err(error) => {
            tracing::debug!(
                name,
                hresult = format!("{:#010X}", error.code().0 as u32),
                "property put failed"
            );
            false
        }
    }
}

/// Reads a property that holds another automation object (e.g. `AdvancedSettings9`).
pub unsafe fn get_dispatch_property(dispatch: &IDispatch, name: &str) -> windows::core::Result<IDispatch> {
    let dispid = get_dispid(dispatch, name)?;
    let params = DISPPARAMS::default();
    let mut result = VARIANT::default();

    dispatch.Invoke(
        dispid,
        &GUID::zeroed(),
        LOCALE_SYSTEM_DEFAULT,
        DISPATCH_PROPERTYGET,
        &params,
        Some(&mut result),
        None,
        None,
    )?;

    let inner = &*result.Anonymous.Anonymous;
    if inner.vt != VT_DISPATCH {
        return Err(windows::core::Error::new(
            DISP_E_MEMBERNOTFOUND,
            format!("{name} is not an object property"),
        ));
    }
    (*inner.Anonymous.pdispVal).clone().ok_or_else(|| {
        windows::core::Error::new(DISP_E_MEMBERNOTFOUND, format!("{name} returned no object"))
    })
}

pub unsafe fn invoke_method(dispatch: &IDispatch, name: &str) -> windows::core::Result<()> {
    invoke_method_i32(dispatch, name, &[])
}

/// Calls a method taking integer arguments, given in declaration order.
pub unsafe fn invoke_method_i32(dispatch: &IDispatch, name: &str, args: &[i32]) -> windows::core::Result<()> {
    let dispid = get_dispid(dispatch, name)?;

    // DISPPARAMS carries arguments last-first.
    let mut variants: Vec<VARIANT> = args.iter().rev().map(|value| i32_variant(*value)).collect();
    let params = DISPPARAMS {
        rgvarg: if variants.is_empty() {
            std::ptr::null_mut()
        } else {
            variants.as_mut_ptr()
        },
        rgdispidNamedArgs: std::ptr::null_mut(),
        cArgs: variants.len() as u32,
        cNamedArgs: 0,
    };

    dispatch.Invoke(
        dispid,
        &GUID::zeroed(),
        LOCALE_SYSTEM_DEFAULT,
        DISPATCH_METHOD,
        &params,
        None,
        None,
        None,
    )
}
