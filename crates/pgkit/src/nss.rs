//! [`Identity`] backed by the C library's name service switch.
//!
//! Uses the reentrant `getpwnam_r`/`getpwuid_r`/`getgrgid_r` lookups and
//! `getgrouplist`, the same path `id` and `getent` take.

use crate::error::{Error, Result};
use crate::identity::Identity;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use std::io;
use std::mem::MaybeUninit;
use std::ptr;

/// Starting size of the string buffer handed to the `*_r` lookups.
const INITIAL_BUFFER: usize = 1024;

/// The buffer stops growing here.
const MAX_BUFFER: usize = 1 << 20;

/// Starting capacity of the group list.
const INITIAL_GROUPS: usize = 32;

/// The group list stops growing here.
const MAX_GROUPS: usize = 65_536;

/// Users and groups as this machine resolves them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

struct Account {
    name: String,
    gid: u32,
}

impl Identity for SystemIdentity {
    fn login_name(&self, uid: u32) -> Option<String> {
        match account_by_uid(uid) {
            Ok(account) => account.map(|a| a.name),
            Err(_) => None,
        }
    }

    fn group_name(&self, gid: u32) -> Result<String> {
        group_by_gid(gid)?.ok_or(Error::UnknownGroup(gid))
    }

    fn groups_of_user(&self, user: &str) -> Result<BTreeSet<String>> {
        let unknown = || Error::UnknownUser(user.to_string());
        let name = CString::new(user).map_err(|_| unknown())?;
        let account = account_by_name(&name)?.ok_or_else(unknown)?;

        let mut groups = BTreeSet::new();
        for gid in group_ids(&name, account.gid)? {
            // A gid without a group entry is legal; it just has no name.
            if let Some(group) = group_by_gid(gid)? {
                groups.insert(group);
            }
        }
        Ok(groups)
    }
}

/// Codes some C libraries use for "no such entry" instead of a null result.
fn is_not_found(code: libc::c_int) -> bool {
    matches!(code, libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM)
}

/// Run a reentrant lookup, doubling its buffer while it reports `ERANGE`.
fn with_buffer<T>(
    mut lookup: impl FnMut(&mut [libc::c_char]) -> std::result::Result<Option<T>, libc::c_int>,
) -> Result<Option<T>> {
    let mut buf: Vec<libc::c_char> = vec![0; INITIAL_BUFFER];
    loop {
        match lookup(&mut buf) {
            Ok(entry) => return Ok(entry),
            Err(code) if is_not_found(code) => return Ok(None),
            Err(libc::ERANGE) if buf.len() < MAX_BUFFER => {
                let len = buf.len() * 2;
                buf.resize(len, 0);
            }
            Err(code) => return Err(Error::Io(io::Error::from_raw_os_error(code))),
        }
    }
}

/// Copy the fields out of a `passwd` lookup.
///
/// # Safety
///
/// `result` must be null or point at an entry filled in by the lookup whose
/// buffer is still alive.
#[allow(unsafe_code)]
unsafe fn account_from(
    code: libc::c_int,
    result: *const libc::passwd,
) -> std::result::Result<Option<Account>, libc::c_int> {
    if code != 0 {
        return Err(code);
    }
    if result.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by the caller.
    let (name, gid) = unsafe { ((*result).pw_name, (*result).pw_gid) };
    // SAFETY: pw_name is a NUL-terminated string inside the lookup buffer.
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
    Ok(Some(Account { name, gid }))
}

#[allow(unsafe_code)]
fn account_by_uid(uid: u32) -> Result<Option<Account>> {
    with_buffer(|buf| {
        let mut entry: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = ptr::null_mut();
        // SAFETY: every pointer refers to live storage and `buf.len()` is
        // the real buffer size.
        unsafe {
            let code = libc::getpwuid_r(
                uid,
                entry.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            account_from(code, result)
        }
    })
}

#[allow(unsafe_code)]
fn account_by_name(name: &CStr) -> Result<Option<Account>> {
    with_buffer(|buf| {
        let mut entry: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = ptr::null_mut();
        // SAFETY: as in account_by_uid; `name` is NUL-terminated.
        unsafe {
            let code = libc::getpwnam_r(
                name.as_ptr(),
                entry.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            account_from(code, result)
        }
    })
}

#[allow(unsafe_code)]
fn group_by_gid(gid: u32) -> Result<Option<String>> {
    with_buffer(|buf| {
        let mut entry: MaybeUninit<libc::group> = MaybeUninit::uninit();
        let mut result: *mut libc::group = ptr::null_mut();
        // SAFETY: every pointer refers to live storage and `buf.len()` is
        // the real buffer size. `result` is only dereferenced when the call
        // filled in `entry`, whose name lives in `buf`.
        unsafe {
            let code = libc::getgrgid_r(
                gid,
                entry.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            );
            if code != 0 {
                return Err(code);
            }
            if result.is_null() {
                return Ok(None);
            }
            let name = CStr::from_ptr((*result).gr_name);
            Ok(Some(name.to_string_lossy().into_owned()))
        }
    })
}

/// Primary and supplementary group ids of `user`.
#[allow(unsafe_code)]
fn group_ids(user: &CStr, primary: u32) -> Result<Vec<u32>> {
    let mut capacity = INITIAL_GROUPS;
    loop {
        let mut ids: Vec<libc::gid_t> = vec![0; capacity];
        let mut count = libc::c_int::try_from(capacity).unwrap_or(libc::c_int::MAX);
        // SAFETY: `ids` holds `count` writable entries and `user` is
        // NUL-terminated.
        let found =
            unsafe { libc::getgrouplist(user.as_ptr(), primary, ids.as_mut_ptr(), &mut count) };
        let reported = usize::try_from(count).unwrap_or(0);

        if found >= 0 {
            ids.truncate(reported);
            return Ok(ids);
        }
        if capacity >= MAX_GROUPS {
            return Err(Error::Io(io::Error::other(format!(
                "{} belongs to more than {MAX_GROUPS} groups",
                user.to_string_lossy()
            ))));
        }
        capacity = reported.max(capacity * 2).min(MAX_GROUPS);
    }
}
