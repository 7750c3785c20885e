//! Privilege drop
//!
//! When started as root the daemon switches to an unprivileged user as
//! soon as configuration is parsed. Group before user, since the group
//! change is no longer permitted once the user id is gone, and a final
//! check that root cannot be regained.

use color_eyre::eyre::{
    Result,
    bail,
    eyre,
};
use nix::unistd::{
    Gid,
    Group,
    Uid,
    User,
    setgid,
    setuid,
};

/// Drop to `user`/`group` when running as root; a no-op otherwise.
/// Each may be a name or a numeric id. Any failure here is fatal.
pub fn drop_privileges(user: &str, group: &str) -> Result<()> {
    if !Uid::effective().is_root() {
        return Ok(());
    }

    let gid = resolve_group(group)?;
    let uid = resolve_user(user)?;

    setgid(gid).map_err(|errno| eyre!("unable to drop group privileges to {group}: {errno}"))?;
    setuid(uid).map_err(|errno| eyre!("unable to drop user privileges to {user}: {errno}"))?;

    if setuid(Uid::from_raw(0)).is_ok() {
        bail!("privilege drop failed: able to regain root");
    }

    tracing::debug!(%user, %group, "dropped privileges");
    Ok(())
}

fn resolve_user(name: &str) -> Result<Uid> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Uid::from_raw(id));
    }

    let user = User::from_name(name)?.ok_or_else(|| eyre!("user {name} does not exist"))?;
    Ok(user.uid)
}

fn resolve_group(name: &str) -> Result<Gid> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(Gid::from_raw(id));
    }

    let group = Group::from_name(name)?.ok_or_else(|| eyre!("group {name} does not exist"))?;
    Ok(group.gid)
}
