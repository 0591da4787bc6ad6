use std::ffi::c_void;

use anyhow::{Context, Result};
use rdssh_domain::CREDENTIAL_PREFIX;
use windows::core::{HRESULT, PCWSTR, PWSTR};
use windows::Win32::Foundation::ERROR_NOT_FOUND;
use windows::Win32::Security::Credentials::{
    CredDeleteW, CredEnumerateW, CredFree, CredReadW, CredWriteW, CREDENTIALW,
    CRED_PERSIST_LOCAL_MACHINE, CRED_TYPE_GENERIC,
};
use zeroize::Zeroizing;

use crate::{CredentialVault, StoredCredential, VaultEntry};

/// Generic credentials in the Windows Credential Manager, persisted per machine.
pub struct WindowsCredentialVault;

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

fn is_not_found(error: &windows::core::Error) -> bool {
    error.code() == HRESULT::from_win32(ERROR_NOT_FOUND.0)
}

unsafe fn read_pwstr(value: PWSTR) -> Option<String> {
    if value.is_null() {
        return None;
    }
    value.to_string().ok()
}

unsafe fn read_blob(credential: &CREDENTIALW) -> Zeroizing<String> {
    if credential.CredentialBlob.is_null() || credential.CredentialBlobSize == 0 {
        return Zeroizing::new(String::new());
    }
    let bytes = std::slice::from_raw_parts(
        credential.CredentialBlob,
        credential.CredentialBlobSize as usize,
    );
    let units: Zeroizing<Vec<u16>> = Zeroizing::new(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    );
    Zeroizing::new(String::from_utf16_lossy(&units))
}

impl CredentialVault for WindowsCredentialVault {
    fn write(&self, target: &str, username: &str, secret: &str, comment: Option<&str>) -> Result<()> {
        let mut target_w = wide(target);
        let mut user_w = wide(username);
        let mut comment_w = comment.map(wide);
        let mut blob: Zeroizing<Vec<u8>> = Zeroizing::new(
            secret
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
        );

        let credential = CREDENTIALW {
            Type: CRED_TYPE_GENERIC,
            TargetName: PWSTR(target_w.as_mut_ptr()),
            UserName: PWSTR(user_w.as_mut_ptr()),
            Comment: comment_w
                .as_mut()
                .map(|c| PWSTR(c.as_mut_ptr()))
                .unwrap_or(PWSTR::null()),
            CredentialBlobSize: blob.len() as u32,
            CredentialBlob: if blob.is_empty() {
                std::ptr::null_mut()
            } else {
                blob.as_mut_ptr()
            },
            Persist: CRED_PERSIST_LOCAL_MACHINE,
            ..Default::default()
        };

        unsafe { CredWriteW(&credential, 0) }
            .with_context(|| format!("CredWriteW failed for {target}"))?;
        Ok(())
    }

    fn read(&self, target: &str) -> Result<Option<StoredCredential>> {
        let target_w = wide(target);
        let mut raw: *mut CREDENTIALW = std::ptr::null_mut();

        let result = unsafe {
            CredReadW(
                PCWSTR(target_w.as_ptr()),
                CRED_TYPE_GENERIC,
                Default::default(),
                &mut raw,
            )
        };
        if let Err(error) = result {
            if is_not_found(&error) {
                return Ok(None);
            }
            return Err(error).with_context(|| format!("CredReadW failed for {target}"));
        }

        let stored = unsafe {
            let credential = &*raw;
            let stored = StoredCredential {
                username: read_pwstr(credential.UserName).unwrap_or_default(),
                secret: read_blob(credential),
                comment: read_pwstr(credential.Comment),
            };
            CredFree(raw as *const c_void);
            stored
        };
        Ok(Some(stored))
    }

    fn delete(&self, target: &str) -> Result<bool> {
        let target_w = wide(target);
        match unsafe { CredDeleteW(PCWSTR(target_w.as_ptr()), CRED_TYPE_GENERIC, Default::default()) } {
            Ok(()) => Ok(true),
            Err(error) if is_not_found(&error) => Ok(false),
            Err(error) => Err(error).with_context(|| format!("CredDeleteW failed for {target}")),
        }
    }

    fn enumerate(&self) -> Result<Vec<VaultEntry>> {
        let filter = wide(&format!("{CREDENTIAL_PREFIX}*"));
        let mut count = 0_u32;
        let mut list: *mut *mut CREDENTIALW = std::ptr::null_mut();

        let result = unsafe {
            CredEnumerateW(PCWSTR(filter.as_ptr()), Default::default(), &mut count, &mut list)
        };
        if let Err(error) = result {
            if is_not_found(&error) {
                return Ok(Vec::new());
            }
            return Err(error).context("CredEnumerateW failed");
        }

        let entries = unsafe {
            let entries = std::slice::from_raw_parts(list, count as usize)
                .iter()
                .filter_map(|ptr| {
                    let credential = &**ptr;
                    let target = read_pwstr(credential.TargetName)?;
                    if !target.starts_with(CREDENTIAL_PREFIX) {
                        return None;
                    }
                    Some(VaultEntry {
                        target,
                        username: read_pwstr(credential.UserName).unwrap_or_default(),
                        comment: read_pwstr(credential.Comment),
                    })
                })
                .collect();
            CredFree(list as *const c_void);
            entries
        };

        tracing::debug!(count, "enumerated vault credentials");
        Ok(entries)
    }
}
