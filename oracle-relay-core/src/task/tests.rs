use std::time::Duration;

use super::TaskGroup;
use crate::runtime::sleep;

#[test_log::test(tokio::test)]
async fn shutdown_after_spawn() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    tg.spawn("shutdown waiter", |handle| async move {
        handle.make_shutdown_rx().await;
    });
    sleep(Duration::from_millis(10)).await;
    tg.shutdown_join_all(None).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn shutdown_before_task_waits() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    tg.spawn("shutdown waiter", |handle| async move {
        sleep(Duration::from_millis(10)).await;
        handle.make_shutdown_rx().await;
    });
    tg.shutdown_join_all(None).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn shutdown_cancels_pending_future() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    let rx = tg.spawn("forever", |handle| async move {
        handle
            .cancel_on_shutdown(std::future::pending::<()>())
            .await
    });
    tg.clone().shutdown_join_all(Some(Duration::from_secs(1))).await?;
    assert!(rx.await?.is_err());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn completion_channel_carries_result() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    let rx = tg.spawn("answer", |handle| async move {
        handle.cancel_on_shutdown(async { 42 }).await
    });
    assert_eq!(rx.await??, 42);
    tg.join_all(None).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn panicking_task_is_reported() {
    let tg = TaskGroup::new();
    let fail = true;
    tg.spawn("panics", move |_| async move {
        assert!(!fail, "boom");
    });
    assert!(tg.join_all(Some(Duration::from_secs(1))).await.is_err());
}
