//! End-to-end MH scenarios: open over a folder with existing numeric
//! files and a sequences sidecar, discover new mail, merge an externally
//! changed sequence, and exercise tombstone/purge sync paths.

mod support;

use std::fs;

use mailbox::{
    cancel::NeverCancelled,
    config::Config,
    mailbox::{IdentityCopier, Mailbox, MailboxKind, NullTableUpdater, PlainFlagSetter, Status},
};
use support::{sample_message, InMemoryHeaderCache, MailParserHeaders};

#[test]
fn open_reads_existing_messages_and_sequences() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1"), sample_message("one")).unwrap();
    fs::write(dir.path().join("2"), sample_message("two")).unwrap();
    fs::write(dir.path().join(".mh_sequences"), "unseen: 2\nflagged: 1\n").unwrap();

    let config = Config::default();
    let mut cache = InMemoryHeaderCache::default();
    let mailbox = Mailbox::open(
        dir.path(),
        MailboxKind::Mh,
        &config,
        &MailParserHeaders,
        &mut cache,
        &NeverCancelled,
    )
    .unwrap();

    assert_eq!(mailbox.msg_count, 2);
    assert!(mailbox::path::mh_path_probe(dir.path()));

    let one = mailbox.emails.iter().find(|e| e.path.to_str() == Some("1")).unwrap();
    assert!(one.flagged);
    assert!(one.read); // not in the unseen sequence

    let two = mailbox.emails.iter().find(|e| e.path.to_str() == Some("2")).unwrap();
    assert!(!two.read);
    assert!(!two.flagged);
}

#[test]
fn check_discovers_new_mail_dropped_directly() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1"), sample_message("one")).unwrap();

    let config = Config::default();
    let mut cache = InMemoryHeaderCache::default();
    let mut mailbox = Mailbox::open(
        dir.path(),
        MailboxKind::Mh,
        &config,
        &MailParserHeaders,
        &mut cache,
        &NeverCancelled,
    )
    .unwrap();
    assert_eq!(mailbox.msg_count, 1);

    fs::write(dir.path().join("2"), sample_message("two")).unwrap();

    let status = mailbox
        .check(
            &config,
            &MailParserHeaders,
            &mut cache,
            &NeverCancelled,
            &mut PlainFlagSetter,
            &mut NullTableUpdater,
            false,
        )
        .unwrap();

    assert_eq!(status, Status::NewMail);
    assert_eq!(mailbox.msg_count, 2);
}

#[test]
fn sync_tombstones_deleted_message_when_purge_disabled() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1"), sample_message("one")).unwrap();

    let config = Config::default(); // mh_purge: false
    let mut cache = InMemoryHeaderCache::default();
    let mut mailbox = Mailbox::open(
        dir.path(),
        MailboxKind::Mh,
        &config,
        &MailParserHeaders,
        &mut cache,
        &NeverCancelled,
    )
    .unwrap();

    mailbox.emails[0].deleted = true;
    mailbox.emails[0].changed = true;

    mailbox
        .sync(
            &config,
            &MailParserHeaders,
            &mut cache,
            &NeverCancelled,
            &mut PlainFlagSetter,
            &mut NullTableUpdater,
            &IdentityCopier,
        )
        .unwrap();

    assert!(!dir.path().join("1").exists());
    assert!(dir.path().join(",1").exists());
    assert_eq!(mailbox.msg_count, 1);
}

#[test]
fn sync_purges_deleted_message_when_purge_enabled() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1"), sample_message("one")).unwrap();

    let mut config = Config::default();
    config.mh_purge = true;
    let mut cache = InMemoryHeaderCache::default();
    let mut mailbox = Mailbox::open(
        dir.path(),
        MailboxKind::Mh,
        &config,
        &MailParserHeaders,
        &mut cache,
        &NeverCancelled,
    )
    .unwrap();

    mailbox.emails[0].deleted = true;
    mailbox.emails[0].changed = true;

    mailbox
        .sync(
            &config,
            &MailParserHeaders,
            &mut cache,
            &NeverCancelled,
            &mut PlainFlagSetter,
            &mut NullTableUpdater,
            &IdentityCopier,
        )
        .unwrap();

    assert!(!dir.path().join("1").exists());
    assert!(!dir.path().join(",1").exists());
    assert_eq!(mailbox.msg_count, 0);
}

#[test]
fn new_message_allocates_next_number_and_updates_sequences() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("1"), sample_message("one")).unwrap();
    fs::write(dir.path().join("4"), sample_message("four")).unwrap();

    let config = Config::default();
    let mut cache = InMemoryHeaderCache::default();
    let mailbox = Mailbox::open(
        dir.path(),
        MailboxKind::Mh,
        &config,
        &MailParserHeaders,
        &mut cache,
        &NeverCancelled,
    )
    .unwrap();

    let mut email = mailbox::email::Email::new("");
    email.flagged = true;
    let mut handle = mailbox.msg_open_new(&email).unwrap();
    std::io::Write::write_all(handle.file_mut(), &sample_message("new")).unwrap();

    let mut mailbox = mailbox;
    mailbox
        .msg_commit(handle, &mut email, &config, true)
        .unwrap();

    assert_eq!(email.path, std::path::PathBuf::from("5"));
    assert!(dir.path().join("5").exists());

    let contents = fs::read_to_string(dir.path().join(".mh_sequences")).unwrap();
    assert!(contents.contains("flagged: 5") || contents.contains("flagged:5"));
}
