//! In-memory stand-in for the jail system calls.

use crate::{
    iov::{ERRMSG, IovecView},
    param::JailId,
    sys::{JailFlags, JailSys},
    utils::until_nul,
};
use nix::errno::Errno;
use std::{collections::BTreeMap, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Get {
        names: Vec<String>,
        flags: JailFlags,
    },
    Set {
        params: BTreeMap<String, Vec<u8>>,
        flags: JailFlags,
    },
    Attach(JailId),
    Remove(JailId),
}

#[derive(Debug, Clone, Default)]
struct FakeJail {
    parent: JailId,
    params: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug)]
struct State {
    jails: BTreeMap<i32, FakeJail>,
    next_jid: i32,
    attached: JailId,
    calls: Vec<Call>,
    set_failure: Option<(Errno, String)>,
    attach_failure: Option<Errno>,
}

/// Records every call and keeps a tiny jail table.
#[derive(Debug)]
pub(crate) struct FakeSys {
    state: Mutex<State>,
}

impl FakeSys {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                jails: BTreeMap::new(),
                next_jid: 1,
                attached: JailId::HOST,
                calls: Vec::new(),
                set_failure: None,
                attach_failure: None,
            }),
        }
    }

    /// Adds a jail under the host without recording a call.
    pub fn with_jail(&self, name: &str, children_max: i32) -> JailId {
        let mut state = self.state.lock().unwrap();
        let jid = state.next_jid;
        state.next_jid += 1;

        let mut params = BTreeMap::new();
        params.insert("name".to_owned(), c_bytes(name));
        params.insert("children.max".to_owned(), children_max.to_ne_bytes().to_vec());
        state.jails.insert(
            jid,
            FakeJail {
                parent: JailId::HOST,
                params,
            },
        );
        JailId(jid)
    }

    /// Adds a child jail of `parent` without recording a call.
    pub fn with_child(&self, parent: JailId, name: &str) -> JailId {
        let jid = self.with_jail(name, 0);
        let mut state = self.state.lock().unwrap();
        if let Some(jail) = state.jails.get_mut(&jid.0) {
            jail.parent = parent;
        }
        jid
    }

    /// Pins the `children.cur` reported for `jid`.
    pub fn report_children(&self, jid: JailId, cur: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(jail) = state.jails.get_mut(&jid.0) {
            jail.params.insert("children.cur".to_owned(), cur.to_ne_bytes().to_vec());
        }
    }

    pub fn set_next_jid(&self, jid: i32) {
        self.state.lock().unwrap().next_jid = jid;
    }

    /// Makes the next `jail_set` fail with `errno` and `message`.
    pub fn fail_next_set(&self, errno: Errno, message: &str) {
        self.state.lock().unwrap().set_failure = Some((errno, message.to_owned()));
    }

    /// Makes every `jail_attach` fail with `errno`.
    pub fn fail_attach(&self, errno: Errno) {
        self.state.lock().unwrap().attach_failure = Some(errno);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Parameters of every `jail_set` issued with the update flag.
    pub fn updates(&self) -> Vec<BTreeMap<String, Vec<u8>>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Set { params, flags } if flags.contains(JailFlags::UPDATE) => Some(params),
                _ => None,
            })
            .collect()
    }

    pub fn exists(&self, jid: JailId) -> bool {
        self.state.lock().unwrap().jails.contains_key(&jid.0)
    }

    pub fn param(&self, jid: JailId, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.jails.get(&jid.0)?.params.get(name).cloned()
    }

    pub fn attached(&self) -> JailId {
        self.state.lock().unwrap().attached
    }
}

impl State {
    fn find(&self, params: &BTreeMap<String, Vec<u8>>) -> Result<i32, String> {
        if let Some(raw) = params.get("jid") {
            let jid = i32::from_ne_bytes(raw[..4].try_into().unwrap());
            if jid != 0 {
                return match self.jails.contains_key(&jid) {
                    true => Ok(jid),
                    false => Err(format!("jail {jid} not found")),
                };
            }
        }

        let name = params
            .get("name")
            .map(|raw| String::from_utf8_lossy(until_nul(raw)).into_owned())
            .unwrap_or_default();

        self.jails
            .iter()
            .find(|(_, jail)| jail.params.get("name").map(|raw| until_nul(raw)) == Some(name.as_bytes()))
            .map(|(jid, _)| *jid)
            .ok_or_else(|| format!("jail \"{name}\" not found"))
    }

    fn children(&self, jid: i32) -> i32 {
        self.jails
            .values()
            .filter(|jail| jail.parent == JailId(jid))
            .count() as i32
    }

    fn children_max(&self, jid: i32) -> i32 {
        self.jails
            .get(&jid)
            .and_then(|jail| jail.params.get("children.max"))
            .map(|raw| i32::from_ne_bytes(raw[..4].try_into().unwrap()))
            .unwrap_or(0)
    }
}

impl JailSys for FakeSys {
    fn jail_get(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        let mut state = self.state.lock().unwrap();
        let params = read_params(iov);
        state.calls.push(Call::Get {
            names: params.keys().cloned().collect(),
            flags,
        });

        let jid = match state.find(&params) {
            Ok(jid) => jid,
            Err(message) => return fail(iov, Errno::ENOENT, &message),
        };

        for index in 0..iov.param_count() - 1 {
            let name = String::from_utf8_lossy(iov.name(index).unwrap_or_default()).into_owned();
            let value = match name.as_str() {
                "jid" => jid.to_ne_bytes().to_vec(),
                "children.cur" => match state.jails[&jid].params.get(&name) {
                    Some(pinned) => pinned.clone(),
                    None => state.children(jid).to_ne_bytes().to_vec(),
                },
                _ => match state.jails[&jid].params.get(&name) {
                    Some(value) => value.clone(),
                    None => return fail(iov, Errno::ENOENT, &format!("unknown parameter: {name}")),
                },
            };

            if let Some(slot) = iov.value_mut(index) {
                let len = slot.len().min(value.len());
                slot[..len].copy_from_slice(&value[..len]);
            }
        }

        Ok(jid)
    }

    fn jail_set(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        let mut state = self.state.lock().unwrap();
        let params = read_params(iov);
        state.calls.push(Call::Set {
            params: params.clone(),
            flags,
        });

        if let Some((errno, message)) = state.set_failure.take() {
            return fail(iov, errno, &message);
        }

        if flags.contains(JailFlags::CREATE) {
            if state.find(&params).is_ok() {
                let name = params.get("name").map(|raw| until_nul(raw)).unwrap_or_default();
                let message = format!("jail \"{}\" already exists", String::from_utf8_lossy(name));
                return fail(iov, Errno::EEXIST, &message);
            }

            let parent = state.attached;
            if parent.is_jail() && state.children(parent.0) >= state.children_max(parent.0) {
                return fail(iov, Errno::EAGAIN, "prison limit exceeded");
            }

            let jid = state.next_jid;
            state.next_jid += 1;

            let mut stored = params;
            stored.remove("jid");
            stored
                .entry("children.max".to_owned())
                .or_insert_with(|| 0i32.to_ne_bytes().to_vec());
            state.jails.insert(
                jid,
                FakeJail {
                    parent,
                    params: stored,
                },
            );

            if flags.contains(JailFlags::ATTACH) {
                state.attached = JailId(jid);
            }
            return Ok(jid);
        }

        let jid = match state.find(&params) {
            Ok(jid) => jid,
            Err(message) => return fail(iov, Errno::ENOENT, &message),
        };

        let jail = state.jails.get_mut(&jid).expect("jail found above");
        for (name, value) in params {
            if name != "jid" {
                jail.params.insert(name, value);
            }
        }
        Ok(jid)
    }

    fn jail_attach(&self, jid: JailId) -> nix::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Attach(jid));
        if let Some(errno) = state.attach_failure {
            return Err(errno);
        }
        if !state.jails.contains_key(&jid.0) {
            return Err(Errno::EINVAL);
        }
        state.attached = jid;
        Ok(())
    }

    fn jail_remove(&self, jid: JailId) -> nix::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove(jid));
        state
            .jails
            .remove(&jid.0)
            .map(drop)
            .ok_or(Errno::EINVAL)
    }
}

pub(crate) fn c_bytes(text: &str) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn read_params(iov: &IovecView<'_>) -> BTreeMap<String, Vec<u8>> {
    (0..iov.param_count())
        .filter_map(|index| {
            let name = String::from_utf8_lossy(iov.name(index)?).into_owned();
            (name != ERRMSG).then(|| (name, iov.value(index).unwrap_or_default().to_vec()))
        })
        .collect()
}

fn fail(iov: &mut IovecView<'_>, errno: Errno, message: &str) -> nix::Result<i32> {
    if let Some(slot) = iov.position(ERRMSG).and_then(|index| iov.value_mut(index)) {
        let len = message.len().min(slot.len() - 1);
        slot[..len].copy_from_slice(&message.as_bytes()[..len]);
        slot[len] = 0;
    }
    Err(errno)
}
