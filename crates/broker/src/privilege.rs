//! Identity switch from root to the session account.
//!
//! Order matters: the primary group first, then the supplementary groups
//! (which need root), then the user id, which gives root up for good.

use std::ffi::CString;
use std::io;

use tracing::info;

use crate::accounts::Account;
use crate::handoff::HandoffError;

/// The three process-credential calls of a privilege drop.
pub trait PrivilegeOps {
    fn set_gid(&mut self, gid: u32) -> io::Result<()>;
    fn init_groups(&mut self, account: &str, gid: u32) -> io::Result<()>;
    fn set_uid(&mut self, uid: u32) -> io::Result<()>;
}

/// Real credential changes through libc.
pub struct SystemPrivileges;

impl PrivilegeOps for SystemPrivileges {
    fn set_gid(&mut self, gid: u32) -> io::Result<()> {
        if unsafe { libc::setgid(gid as libc::gid_t) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let (real, effective) = unsafe { (libc::getgid(), libc::getegid()) };
        if real != gid as libc::gid_t || effective != gid as libc::gid_t {
            return Err(io::Error::other(format!(
                "gid is {real}/{effective} after setgid({gid})"
            )));
        }
        Ok(())
    }

    fn init_groups(&mut self, account: &str, gid: u32) -> io::Result<()> {
        let name = CString::new(account)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "account name has NUL"))?;
        if unsafe { libc::initgroups(name.as_ptr(), gid as _) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_uid(&mut self, uid: u32) -> io::Result<()> {
        if unsafe { libc::setuid(uid as libc::uid_t) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let (real, effective) = unsafe { (libc::getuid(), libc::geteuid()) };
        if real != uid as libc::uid_t || effective != uid as libc::uid_t {
            return Err(io::Error::other(format!(
                "uid is {real}/{effective} after setuid({uid})"
            )));
        }
        Ok(())
    }
}

/// Become `account`: setgid, initgroups, setuid, in that order.
/// Stops at the first failure.
pub fn drop_to(ops: &mut dyn PrivilegeOps, account: &Account) -> Result<(), HandoffError> {
    ops.set_gid(account.gid)
        .map_err(|source| HandoffError::SetGid {
            gid: account.gid,
            source,
        })?;
    ops.init_groups(&account.name, account.gid)
        .map_err(|source| HandoffError::InitGroups {
            account: account.name.clone(),
            source,
        })?;
    ops.set_uid(account.uid)
        .map_err(|source| HandoffError::SetUid {
            uid: account.uid,
            source,
        })?;

    info!(
        component = "privilege",
        event = "privilege.dropped",
        account = %account.name,
        uid = account.uid,
        gid = account.gid,
        "Dropped privileges"
    );
    Ok(())
}
