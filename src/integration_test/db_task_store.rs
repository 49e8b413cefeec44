use super::test_util;
use crate::domain::task::driven_ports::{TaskReader, TaskSubscriber, TaskWriter};
use crate::domain::task::{NewTask, Priority, TimeEntry, UpdateTask};
use crate::persistence::db_task_driven_ports::{DbTaskReader, DbTaskSubscriber, DbTaskWriter};
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use speculoos::prelude::*;
use std::time::Duration;
use uuid::Uuid;

const USER: &str = "user-1";
const OTHER_USER: &str = "user-2";

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_owned(),
        description: Some("Quarterly numbers".to_owned()),
        due_date: Utc.with_ymd_and_hms(2026, 11, 2, 17, 0, 0).unwrap(),
        priority: Priority::High,
        category: "work".to_owned(),
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn created_task_reads_back() {
    test_util::prepare_db_and_test(|_pool, mut ext_cxn| async move {
        let task_id = DbTaskWriter
            .create_task_for_user(USER, &new_task("Write report"), &mut ext_cxn)
            .await
            .unwrap();

        let task = DbTaskReader
            .user_task_by_id(USER, task_id, &mut ext_cxn)
            .await
            .unwrap()
            .expect("the new task should be found");

        assert_eq!(USER, task.owner_user_id);
        assert_eq!("Write report", task.title);
        assert_eq!(Some("Quarterly numbers".to_owned()), task.description);
        assert_eq!(Priority::High, task.priority);
        assert_eq!("work", task.category);
        assert!(!task.is_completed);
        assert_eq!(0, task.time_spent);
        assert!(task.time_entries.is_empty());
        assert_eq!(None, task.display_order);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn tasks_are_scoped_to_their_owner() {
    test_util::prepare_db_and_test(|_pool, mut ext_cxn| async move {
        let task_id = DbTaskWriter
            .create_task_for_user(USER, &new_task("Mine"), &mut ext_cxn)
            .await
            .unwrap();
        DbTaskWriter
            .create_task_for_user(OTHER_USER, &new_task("Theirs"), &mut ext_cxn)
            .await
            .unwrap();

        let tasks = DbTaskReader.tasks_for_user(USER, &mut ext_cxn).await.unwrap();
        assert_eq!(1, tasks.len());
        assert_eq!("Mine", tasks[0].title);

        let foreign_read = DbTaskReader.user_task_by_id(OTHER_USER, task_id, &mut ext_cxn).await;
        assert_that!(foreign_read).is_ok().is_none();

        let foreign_write = DbTaskWriter
            .set_completion(OTHER_USER, task_id, true, &mut ext_cxn)
            .await;
        assert_that!(foreign_write).is_ok_containing(false);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn partial_update_keeps_other_fields() {
    test_util::prepare_db_and_test(|_pool, mut ext_cxn| async move {
        let task_id = DbTaskWriter
            .create_task_for_user(USER, &new_task("Write report"), &mut ext_cxn)
            .await
            .unwrap();

        let updated = DbTaskWriter
            .update_task(
                USER,
                task_id,
                &UpdateTask {
                    title: Some("Write final report".to_owned()),
                    description: Some(String::new()),
                    priority: Some(Priority::Low),
                    ..Default::default()
                },
                &mut ext_cxn,
            )
            .await;
        assert_that!(updated).is_ok_containing(true);

        let task = DbTaskReader
            .user_task_by_id(USER, task_id, &mut ext_cxn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!("Write final report", task.title);
        assert_eq!(None, task.description);
        assert_eq!(Priority::Low, task.priority);
        assert_eq!("work", task.category);
        assert_eq!(Utc.with_ymd_and_hms(2026, 11, 2, 17, 0, 0).unwrap(), task.due_date);

        let missing = DbTaskWriter
            .update_task(USER, Uuid::new_v4(), &UpdateTask::default(), &mut ext_cxn)
            .await;
        assert_that!(missing).is_ok_containing(false);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn completion_order_and_time_log_are_saved() {
    test_util::prepare_db_and_test(|_pool, mut ext_cxn| async move {
        let task_id = DbTaskWriter
            .create_task_for_user(USER, &new_task("Write report"), &mut ext_cxn)
            .await
            .unwrap();
        let entries = vec![
            TimeEntry {
                id: Uuid::new_v4(),
                start_time: Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap(),
                duration: 1800,
            },
            TimeEntry {
                id: Uuid::new_v4(),
                start_time: Utc.with_ymd_and_hms(2026, 10, 19, 13, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2026, 10, 19, 13, 5, 0).unwrap(),
                duration: 300,
            },
        ];

        assert_that!(DbTaskWriter.set_completion(USER, task_id, true, &mut ext_cxn).await)
            .is_ok_containing(true);
        assert_that!(DbTaskWriter.set_display_order(USER, task_id, 3, &mut ext_cxn).await)
            .is_ok_containing(true);
        assert_that!(
            DbTaskWriter
                .save_time_log(USER, task_id, &entries, 2100, &mut ext_cxn)
                .await
        )
        .is_ok_containing(true);

        let task = DbTaskReader
            .user_task_by_id(USER, task_id, &mut ext_cxn)
            .await
            .unwrap()
            .unwrap();
        assert!(task.is_completed);
        assert_eq!(Some(3), task.display_order);
        assert_eq!(2100, task.time_spent);
        assert_eq!(entries, task.time_entries);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn older_rows_are_still_readable() {
    test_util::prepare_db_and_test(|pool, mut ext_cxn| async move {
        let task_id: Uuid = sqlx::query_scalar(
            "INSERT INTO task (user_id, title, due_date, priority, category, time_spent, time_entries) \
             VALUES ($1, 'Legacy', now(), '4', 'personal', 60, \
             '[{\"startTime\": \"2026-01-05T10:00:00Z\", \"endTime\": \"2026-01-05T10:01:00Z\"}]') \
             RETURNING id",
        )
        .bind(USER)
        .fetch_one(&pool)
        .await
        .unwrap();

        let task = DbTaskReader
            .user_task_by_id(USER, task_id, &mut ext_cxn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Priority::High, task.priority);
        assert_eq!(1, task.time_entries.len());
        assert_eq!(60, task.time_entries[0].duration);

        let reread = DbTaskReader
            .user_task_by_id(USER, task_id, &mut ext_cxn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.time_entries[0].id, reread.time_entries[0].id);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn deleting_is_idempotent() {
    test_util::prepare_db_and_test(|_pool, mut ext_cxn| async move {
        let task_id = DbTaskWriter
            .create_task_for_user(USER, &new_task("Write report"), &mut ext_cxn)
            .await
            .unwrap();

        assert_that!(DbTaskWriter.delete_task(USER, task_id, &mut ext_cxn).await).is_ok();
        assert_that!(DbTaskWriter.delete_task(USER, task_id, &mut ext_cxn).await).is_ok();

        let tasks = DbTaskReader.tasks_for_user(USER, &mut ext_cxn).await.unwrap();
        assert!(tasks.is_empty());
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn subscription_follows_task_changes() {
    test_util::prepare_db_and_test(|pool, mut ext_cxn| async move {
        let subscriber = DbTaskSubscriber::start(pool).await.unwrap();
        let mut snapshots = subscriber.subscribe(USER);

        let first = tokio::time::timeout(Duration::from_secs(5), snapshots.next())
            .await
            .expect("the first snapshot should arrive")
            .expect("the stream should not end")
            .unwrap();
        assert!(first.is_empty());

        // Changes for other users do not produce a snapshot
        DbTaskWriter
            .create_task_for_user(OTHER_USER, &new_task("Theirs"), &mut ext_cxn)
            .await
            .unwrap();
        DbTaskWriter
            .create_task_for_user(USER, &new_task("Mine"), &mut ext_cxn)
            .await
            .unwrap();

        let second = tokio::time::timeout(Duration::from_secs(5), snapshots.next())
            .await
            .expect("a snapshot should follow the insert")
            .expect("the stream should not end")
            .unwrap();
        assert_eq!(1, second.len());
        assert_eq!("Mine", second[0].title);
    })
    .await;
}

#[tokio::test]
#[cfg_attr(not(feature = "integration_test"), ignore)]
async fn subscriptions_share_one_listener_connection() {
    test_util::prepare_db_and_test(|pool, _ext_cxn| async move {
        let subscriber = DbTaskSubscriber::start(pool.clone()).await.unwrap();

        // More open streams than the pool has connections
        let mut open_streams = Vec::new();
        for _ in 0..30 {
            let mut snapshots = subscriber.subscribe(USER);
            tokio::time::timeout(Duration::from_secs(5), snapshots.next())
                .await
                .expect("every subscription should get its first snapshot")
                .expect("the stream should not end")
                .unwrap();
            open_streams.push(snapshots);
        }

        let connections: i64 =
            sqlx::query_scalar("SELECT count(*) FROM pg_stat_activity WHERE datname = current_database()")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(connections <= 21, "{connections} connections are open for 30 subscriptions");
        assert_eq!(30, open_streams.len());
    })
    .await;
}
