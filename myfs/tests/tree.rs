mod common;

use std::fmt::Debug;

use common::{assert_counters, small_volume, volume};
use myfs::{DirectoryTree, Error, InodeKind, Perm, Result, User};

fn all_ok<T: Debug>(results: Vec<Result<T>>) -> Vec<T> {
    results.into_iter().map(|result| result.unwrap()).collect()
}

fn add_alice(tree: &mut DirectoryTree) {
    tree.fs_mut()
        .accounts_mut()
        .add_user(User::new(7, 1, "alice", "Alice", "/home2", "pw"))
        .unwrap();
}

#[test]
fn mkdir_links_dot_entries() {
    let (_dir, _path, mut tree) = volume(4, 4);
    let ids = all_ok(tree.mkdir(&["/a", "/a/b"]));
    assert_eq!(ids, [4, 5]);

    assert_eq!(tree.resolve("/a/.").unwrap(), 4);
    assert_eq!(tree.resolve("/a/..").unwrap(), 0);
    assert_eq!(tree.resolve("/a/b/..").unwrap(), 4);
    assert_eq!(tree.resolve_inode("/").unwrap().links, 4);
    assert_eq!(tree.resolve_inode("/a").unwrap().links, 3);

    let b = tree.resolve_inode("/a/b").unwrap();
    assert_eq!(b.links, 2);
    assert_eq!(b.name(), "b");
    assert_eq!(b.kind, InodeKind::Directory);
    assert_eq!(b.size, 4096);
    assert_counters(tree.fs());
}

#[test]
fn mkdir_reports_each_path() {
    let (_dir, _path, mut tree) = volume(4, 4);
    let long = "n".repeat(245);
    let results = tree.mkdir(&["/a", "/missing/b", "/a", "/c", long.as_str(), "/a/.."]);

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::NotFound(_))));
    assert!(matches!(results[2], Err(Error::AlreadyExists(_))));
    assert!(results[3].is_ok());
    assert!(matches!(results[4], Err(Error::InvalidName(_))));
    assert!(matches!(results[5], Err(Error::InvalidName(_))));

    tree.create_file("/f", b"").unwrap();
    assert!(matches!(
        tree.mkdir(&["/f/sub"]).remove(0),
        Err(Error::NotADirectory(_))
    ));
    assert_counters(tree.fs());
}

#[test]
fn directory_capacity() {
    let (_dir, _path, mut tree) = volume(4, 4);
    all_ok(tree.mkdir(&["/d"]));
    let slots = tree.fs().entries_per_block();
    assert_eq!(slots, 16);

    for i in 0..slots - 2 {
        tree.create_file(&format!("/d/f{i}"), b"x").unwrap();
    }
    let used = tree.fs().inode_usage().used;
    assert!(matches!(
        tree.create_file("/d/one-more", b"x"),
        Err(Error::DirectoryFull(_))
    ));
    assert!(matches!(
        tree.mkdir(&["/d/sub"]).remove(0),
        Err(Error::DirectoryFull(_))
    ));
    assert_eq!(tree.fs().inode_usage().used, used);

    // 腾出一个槽位后又能放下
    all_ok(tree.rm(&["/d/f3"], false));
    tree.create_file("/d/one-more", b"x").unwrap();
    assert_counters(tree.fs());
}

#[test]
fn small_blocks_hold_two_children() {
    let (_dir, _path, mut tree) = small_volume();
    all_ok(tree.mkdir(&["/d"]));
    tree.create_file("/d/a", b"").unwrap();
    tree.create_file("/d/b", b"").unwrap();
    assert!(matches!(
        tree.create_file("/d/c", b""),
        Err(Error::DirectoryFull(_))
    ));
}

#[test]
fn recursive_rm_restores_usage() {
    let (_dir, _path, mut tree) = volume(4, 4);
    let inodes = tree.fs().inode_usage();
    let blocks = tree.fs().block_usage();

    all_ok(tree.mkdir(&["/a", "/a/b", "/a/c"]));
    tree.create_file("/a/b/f", &[7; 20_000]).unwrap();
    tree.create_file("/a/g", b"g").unwrap();

    assert!(matches!(
        tree.rm(&["/a"], false).remove(0),
        Err(Error::DirectoryNotEmpty(_))
    ));
    assert!(tree.resolve("/a/b/f").is_ok());

    all_ok(tree.rm(&["/a"], true));
    assert!(matches!(tree.resolve("/a"), Err(Error::NotFound(_))));
    assert_eq!(tree.resolve_inode("/").unwrap().links, 3);
    assert_eq!(tree.fs().inode_usage(), inodes);
    assert_eq!(tree.fs().block_usage(), blocks);
    assert_counters(tree.fs());
}

#[test]
fn rm_edge_cases() {
    let (_dir, _path, mut tree) = volume(4, 4);
    all_ok(tree.mkdir(&["/empty"]));
    tree.create_file("/f", b"data").unwrap();

    let results = tree.rm(&["/empty", "/missing", "/f", "/", "/user/.."], false);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::NotFound(_))));
    assert!(results[2].is_ok());
    assert!(matches!(results[3], Err(Error::InvalidName(_))));
    assert!(matches!(results[4], Err(Error::InvalidName(_))));

    assert!(tree.resolve("/empty").is_err());
    assert!(tree.resolve("/f").is_err());
    assert!(tree.resolve("/user").is_ok());
    assert_counters(tree.fs());
}

#[test]
fn mv_into_directory_and_rename() {
    let (_dir, _path, mut tree) = volume(4, 4);
    let id = tree.create_file("/f", b"payload").unwrap();
    all_ok(tree.mkdir(&["/d"]));

    tree.mv("/f", "/d").unwrap();
    assert!(matches!(tree.resolve("/f"), Err(Error::NotFound(_))));
    assert_eq!(tree.resolve("/d/f").unwrap(), id);

    tree.mv("/d/f", "/d/g").unwrap();
    assert_eq!(tree.resolve("/d/g").unwrap(), id);
    assert!(tree.resolve("/d/f").is_err());
    assert_eq!(tree.resolve_inode("/d/g").unwrap().name(), "g");

    tree.mv("/d/g", "/h").unwrap();
    assert_eq!(tree.read_file("/h").unwrap(), b"payload");

    tree.create_file("/taken", b"").unwrap();
    assert!(matches!(
        tree.mv("/h", "/taken"),
        Err(Error::AlreadyExists(_))
    ));
    assert!(matches!(tree.mv("/nope", "/d"), Err(Error::NotFound(_))));
    assert_counters(tree.fs());
}

#[test]
fn mv_directory_updates_parent_links() {
    let (_dir, _path, mut tree) = volume(4, 4);
    all_ok(tree.mkdir(&["/x", "/x/y", "/x/y/z", "/d"]));
    let y = tree.resolve("/x/y").unwrap();
    let d = tree.resolve("/d").unwrap();

    tree.mv("/x/y", "/d").unwrap();
    assert_eq!(tree.resolve("/d/y").unwrap(), y);
    assert_eq!(tree.resolve("/d/y/..").unwrap(), d);
    assert_eq!(tree.resolve("/d/y/z/../..").unwrap(), d);
    assert_eq!(tree.resolve_inode("/x").unwrap().links, 2);
    assert_eq!(tree.resolve_inode("/d").unwrap().links, 3);

    assert!(matches!(tree.mv("/d", "/d/y/z"), Err(Error::InvalidMove(_))));
    assert!(matches!(tree.mv("/d", "/d"), Err(Error::InvalidMove(_))));
    assert!(tree.resolve("/d/y/z").is_ok());
}

#[test]
fn hard_links_share_the_inode() {
    let (_dir, _path, mut tree) = volume(4, 4);
    let blocks = tree.fs().block_usage();
    let id = tree.create_file("/f", b"shared").unwrap();

    tree.ln("/f", "/user/f2").unwrap();
    assert_eq!(tree.resolve("/user/f2").unwrap(), id);
    assert_eq!(tree.stat("/f").unwrap().links, 2);

    all_ok(tree.rm(&["/f"], false));
    assert_eq!(tree.read_file("/user/f2").unwrap(), b"shared");
    assert_eq!(tree.stat("/user/f2").unwrap().links, 1);
    assert!(tree.fs().inode_bitmap().is_set(id as usize));

    all_ok(tree.rm(&["/user/f2"], false));
    assert!(!tree.fs().inode_bitmap().is_set(id as usize));
    assert_eq!(tree.fs().block_usage(), blocks);

    assert!(matches!(tree.ln("/user", "/u2"), Err(Error::IsADirectory(_))));
    tree.create_file("/g", b"").unwrap();
    assert!(matches!(tree.ln("/g", "/user"), Err(Error::AlreadyExists(_))));
    assert_counters(tree.fs());
}

#[test]
fn whereis_walks_depth_first() {
    let (_dir, _path, mut tree) = volume(4, 4);
    all_ok(tree.mkdir(&["/a", "/a/x", "/x"]));
    tree.create_file("/a/x/x", b"").unwrap();

    assert_eq!(tree.whereis("x").unwrap(), ["/a/x", "/a/x/x", "/x"]);
    assert_eq!(tree.whereis("root").unwrap(), ["/user/root"]);
    assert!(tree.whereis("nothing").unwrap().is_empty());
}

#[test]
fn relative_paths_resolve_like_their_normal_form() {
    let (_dir, _path, mut tree) = volume(4, 4);
    all_ok(tree.mkdir(&["/user/root/home/docs"]));
    tree.cd("/user/root").unwrap();

    for path in [
        "home",
        "./home/docs",
        "home/docs/..",
        "../root/home",
        "..",
        "../..",
        "../../..",
        "/user/./root//home/",
        ".",
    ] {
        let normal = tree.normalize(path);
        assert_eq!(tree.resolve(path).unwrap(), tree.resolve(&normal).unwrap(), "{path}");
    }
    assert_eq!(tree.normalize("../../.."), "/");

    tree.create_file("notes", b"").unwrap();
    assert!(tree.resolve("/user/root/notes").is_ok());
    assert!(matches!(tree.cd("notes"), Err(Error::NotADirectory(_))));
    assert!(matches!(tree.cd("/nope"), Err(Error::NotFound(_))));
    assert_eq!(tree.cwd(), "/user/root");
}

#[test]
fn list_shows_every_entry() {
    let (_dir, _path, mut tree) = volume(4, 4);
    tree.create_file("/f", b"12345").unwrap();

    let names: Vec<_> = tree
        .list("/")
        .unwrap()
        .into_iter()
        .map(|item| (item.name, item.kind))
        .collect();
    assert_eq!(
        names,
        [
            (".".to_string(), InodeKind::Directory),
            ("..".to_string(), InodeKind::Directory),
            ("user".to_string(), InodeKind::Directory),
            ("f".to_string(), InodeKind::File),
        ]
    );
    assert!(matches!(tree.list("/f"), Err(Error::NotADirectory(_))));
}

#[test]
fn others_are_kept_out() {
    let (_dir, _path, mut tree) = volume(4, 4);
    add_alice(&mut tree);
    all_ok(tree.mkdir(&["/home2"]));
    tree.chown("alice", "/home2", false).unwrap();
    tree.create_file("/secret", b"root only").unwrap();

    tree.login("alice").unwrap();
    assert_eq!(tree.cwd(), "/home2");
    assert_eq!(tree.user().uid, 7);

    tree.create_file("mine", b"ok").unwrap();
    assert_eq!(tree.stat("mine").unwrap().uid, 7);
    assert!(matches!(
        tree.mkdir(&["/nope"]).remove(0),
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        tree.read_file("/secret"),
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        tree.rm(&["/secret"], false).remove(0),
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        tree.chmod("77", "/secret"),
        Err(Error::PermissionDenied(_))
    ));
    assert!(tree.resolve("/secret").is_ok());

    tree.set_user(0).unwrap();
    assert_eq!(tree.read_file("/home2/mine").unwrap(), b"ok");
}

#[test]
fn group_bits_apply_to_members() {
    let (_dir, _path, mut tree) = volume(4, 4);
    add_alice(&mut tree);
    all_ok(tree.mkdir(&["/shared"]));
    tree.chgrp("users", "/shared", false).unwrap();

    tree.set_user(7).unwrap();
    tree.create_file("/shared/a", b"").unwrap();

    tree.set_user(0).unwrap();
    tree.chmod("70", "/shared").unwrap();
    tree.set_user(7).unwrap();
    assert!(matches!(
        tree.create_file("/shared/b", b""),
        Err(Error::PermissionDenied(_))
    ));
}

#[test]
fn chmod_validates_mode() {
    let (_dir, _path, mut tree) = volume(4, 4);
    tree.create_file("/f", b"").unwrap();

    tree.chmod("75", "/f").unwrap();
    let perms = tree.stat("/f").unwrap().perms;
    assert_eq!(perms.bits(), 0o75);
    assert_eq!(Perm::render(perms), "rwxr-x");

    for bad in ["8", "777", "79", "ab", ""] {
        assert!(
            matches!(tree.chmod(bad, "/f"), Err(Error::InvalidPermissions(_))),
            "{bad}"
        );
    }
    assert_eq!(tree.stat("/f").unwrap().perms.bits(), 0o75);
}

#[test]
fn chown_and_chgrp_recurse_on_request() {
    let (_dir, _path, mut tree) = volume(4, 4);
    add_alice(&mut tree);
    all_ok(tree.mkdir(&["/t", "/t/u"]));
    tree.create_file("/t/u/f", b"").unwrap();

    tree.chgrp("users", "/t", false).unwrap();
    assert_eq!(tree.stat("/t").unwrap().gid, 1);
    assert_eq!(tree.stat("/t/u").unwrap().gid, 0);

    tree.chown("alice", "/t", true).unwrap();
    for path in ["/t", "/t/u", "/t/u/f"] {
        assert_eq!(tree.stat(path).unwrap().uid, 7, "{path}");
    }
    tree.chgrp("users", "/t", true).unwrap();
    assert_eq!(tree.stat("/t/u/f").unwrap().gid, 1);

    assert!(matches!(
        tree.chown("mallory", "/t", true),
        Err(Error::NoSuchAccount(_))
    ));
    assert!(matches!(
        tree.chgrp("nobody", "/t", true),
        Err(Error::NoSuchAccount(_))
    ));
}
