use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::OnDisk;
use super::codec::{Decoder, Encoder};
use crate::{Error, ROOT_GID, ROOT_UID, Result, USERS_GID};

/// 用户记录，口令只保存其 SHA-256 摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: u32,
    /// 主组
    pub gid: u32,
    pub name: String,
    pub full_name: String,
    pub home: String,
    password: [u8; 32],
}

impl User {
    pub fn new(uid: u32, gid: u32, name: &str, full_name: &str, home: &str, password: &str) -> Self {
        let mut digest = [0; 32];
        digest.copy_from_slice(&Sha256::digest(password.as_bytes()));

        Self {
            uid,
            gid,
            name: name.to_string(),
            full_name: full_name.to_string(),
            home: home.to_string(),
            password: digest,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password[..] == Sha256::digest(password.as_bytes())[..]
    }
}

impl OnDisk for User {
    const SIZE: usize = 256;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new(Self::SIZE);
        enc.put_u32(self.uid);
        enc.put_u32(self.gid);
        enc.put_name(&self.name, 32)?;
        enc.put_name(&self.full_name, 64)?;
        enc.put_name(&self.home, 96)?;
        enc.put_bytes(&self.password);

        Ok(enc.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, Self::SIZE, "user record")?;

        Ok(Self {
            uid: dec.u32("uid")?,
            gid: dec.u32("gid")?,
            name: dec.name(32)?,
            full_name: dec.name(64)?,
            home: dec.name(96)?,
            password: dec.bytes(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub gid: u32,
    pub name: String,
    pub members: Vec<u32>,
}

impl Group {
    /// 每个组记录最多容纳的成员数
    pub const MEMBER_CAP: usize = 46;

    pub fn new(gid: u32, name: &str) -> Self {
        Self {
            gid,
            name: name.to_string(),
            members: Vec::new(),
        }
    }

    #[inline]
    pub fn has_member(&self, uid: u32) -> bool {
        self.members.contains(&uid)
    }
}

impl OnDisk for Group {
    const SIZE: usize = 256;

    fn encode(&self) -> Result<Vec<u8>> {
        if self.members.len() > Self::MEMBER_CAP {
            return Err(Error::AccountTableFull);
        }

        let mut enc = Encoder::new(Self::SIZE);
        enc.put_u32(self.gid);
        enc.put_name(&self.name, 32)?;
        enc.put_u32(self.members.len() as u32);
        for slot in 0..Self::MEMBER_CAP {
            enc.put_ptr(self.members.get(slot).copied());
        }

        Ok(enc.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, Self::SIZE, "group record")?;

        let gid = dec.u32("gid")?;
        let name = dec.name(32)?;
        let count = dec.u32("member count")? as usize;
        if count > Self::MEMBER_CAP {
            return Err(Error::Corrupt(format!("group {name} has {count} members")));
        }
        let members = (0..Self::MEMBER_CAP)
            .filter_map(|_| dec.ptr())
            .take(count)
            .collect();

        Ok(Self { gid, name, members })
    }
}

/// 用户表与组表，各占数据区中的一块
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountTable {
    users: BTreeMap<u32, User>,
    groups: BTreeMap<u32, Group>,
}

impl AccountTable {
    /// 格式化时的初始账户：root 用户、root 组与空的 users 组
    pub fn bootstrap(root_password: &str, root_home: &str) -> Self {
        let mut root_group = Group::new(ROOT_GID, "root");
        root_group.members.push(ROOT_UID);

        let mut table = Self::default();
        table.users.insert(
            ROOT_UID,
            User::new(ROOT_UID, ROOT_GID, "root", "Administrator", root_home, root_password),
        );
        table.groups.insert(ROOT_GID, root_group);
        table.groups.insert(USERS_GID, Group::new(USERS_GID, "users"));
        table
    }

    #[inline]
    pub fn user(&self, uid: u32) -> Option<&User> {
        self.users.get(&uid)
    }

    pub fn user_by_name(&self, name: &str) -> Option<&User> {
        self.users.values().find(|user| user.name == name)
    }

    #[inline]
    pub fn group(&self, gid: u32) -> Option<&Group> {
        self.groups.get(&gid)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.values().find(|group| group.name == name)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// 新增用户，并将其加入主组
    pub fn add_user(&mut self, user: User) -> Result<()> {
        if self.users.contains_key(&user.uid) || self.user_by_name(&user.name).is_some() {
            return Err(Error::AlreadyExists(user.name));
        }
        let group = self
            .groups
            .get_mut(&user.gid)
            .ok_or_else(|| Error::NoSuchAccount(format!("gid {}", user.gid)))?;
        if !group.has_member(user.uid) {
            group.members.push(user.uid);
        }

        log::debug!("add user {} (uid {})", user.name, user.uid);
        self.users.insert(user.uid, user);
        Ok(())
    }

    pub fn add_group(&mut self, group: Group) -> Result<()> {
        if self.groups.contains_key(&group.gid) || self.group_by_name(&group.name).is_some() {
            return Err(Error::AlreadyExists(group.name));
        }

        log::debug!("add group {} (gid {})", group.name, group.gid);
        self.groups.insert(group.gid, group);
        Ok(())
    }

    /// 组成员，或以该组为主组
    pub fn is_member(&self, uid: u32, gid: u32) -> bool {
        self.groups.get(&gid).is_some_and(|group| group.has_member(uid))
            || self.users.get(&uid).is_some_and(|user| user.gid == gid)
    }

    /// 仅 root 享有特权
    #[inline]
    pub fn is_privileged(&self, uid: u32) -> bool {
        uid == ROOT_UID
    }

    pub fn encode_users(&self, block_size: usize) -> Result<Vec<u8>> {
        encode_table(self.users.values(), block_size)
    }

    pub fn encode_groups(&self, block_size: usize) -> Result<Vec<u8>> {
        encode_table(self.groups.values(), block_size)
    }

    pub fn decode(users: &[u8], groups: &[u8]) -> Result<Self> {
        Ok(Self {
            users: decode_table::<User>(users)?
                .into_iter()
                .map(|user| (user.uid, user))
                .collect(),
            groups: decode_table::<Group>(groups)?
                .into_iter()
                .map(|group| (group.gid, group))
                .collect(),
        })
    }
}

/// `count i32` 后紧跟各记录
fn encode_table<'a, T: OnDisk + 'a>(
    records: impl ExactSizeIterator<Item = &'a T>,
    block_size: usize,
) -> Result<Vec<u8>> {
    let count = records.len();
    if 4 + count * T::SIZE > block_size {
        return Err(Error::AccountTableFull);
    }

    let mut block = Vec::with_capacity(block_size);
    block.extend_from_slice(&(count as i32).to_be_bytes());
    for record in records {
        block.extend(record.encode()?);
    }
    block.resize(block_size, 0);

    Ok(block)
}

fn decode_table<T: OnDisk>(block: &[u8]) -> Result<Vec<T>> {
    let Some((count, records)) = block.split_first_chunk::<4>() else {
        return Err(Error::Corrupt("account table block too short".to_string()));
    };
    let count = i32::from_be_bytes(*count);
    let count = usize::try_from(count)
        .ok()
        .filter(|&count| count * T::SIZE <= records.len())
        .ok_or_else(|| Error::Corrupt(format!("account table claims {count} records")))?;

    records
        .chunks_exact(T::SIZE)
        .take(count)
        .map(T::decode)
        .collect()
}
