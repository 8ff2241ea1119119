#![cfg(unix)]

mod common;

use common::{CONVERSION_TRANSCRIPT, FakeFFmpeg, Recorded, Recorder};
use ffconvert::{Completion, ConversionEvent, Error, FFmpeg, MediaSource, VideoSize};
use futures::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn test_convert_reports_progress_then_completion() {
    let fake = FakeFFmpeg::printing(CONVERSION_TRANSCRIPT, 0);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().video_codec("libx264").duration(10.0).build();

    let recorder = Recorder::default();
    let target = fake.path("nested/out.mp4");
    converter
        .convert(&[MediaSource::from(fake.input.clone())], &target, &recorder)
        .await
        .unwrap();

    let events = recorder.events();
    assert!(matches!(&events[0], Recorded::Start(Some(d)) if d.format == "mov"));
    assert_eq!(
        &events[1..],
        &[
            Recorded::Progress(50),
            Recorded::Progress(100),
            Recorded::Complete(Completion::Completed),
        ]
    );
    assert!(fake.exists("nested"), "target directory was not created");
    assert!(converter.unhandled_messages().is_empty());
}

#[tokio::test]
async fn test_convert_uses_probed_duration() {
    let fake = FakeFFmpeg::printing(CONVERSION_TRANSCRIPT, 0);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let recorder = Recorder::default();
    converter
        .convert(&[fake.input.clone().into()], fake.path("out.mp4"), &recorder)
        .await
        .unwrap();

    // 5 of 20 probed seconds
    assert_eq!(recorder.progress(), vec![25, 100]);
    match &recorder.events()[0] {
        Recorded::Start(Some(description)) => {
            assert_eq!(description.duration_millis, Some(20_000));
            let video = description.video.as_ref().unwrap();
            assert_eq!(video.size, Some(VideoSize::new(1280, 720)));
            assert_eq!(description.audio.as_ref().unwrap().channels, Some(2));
        }
        other => panic!("unexpected first event: {other:?}"),
    }
}

#[tokio::test]
async fn test_concatenated_sources_are_not_probed() {
    let fake = FakeFFmpeg::printing(CONVERSION_TRANSCRIPT, 0);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let recorder = Recorder::default();
    let sources: [MediaSource; 2] = [fake.input.clone().into(), fake.input.clone().into()];
    converter
        .convert(&sources, fake.path("out.mp4"), &recorder)
        .await
        .unwrap();

    // No description means no duration, so only the final 100% is reported.
    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Start(None),
            Recorded::Progress(100),
            Recorded::Complete(Completion::Completed),
        ]
    );
}

#[tokio::test]
async fn test_non_zero_exit_is_process_failure_with_last_warning() {
    let transcript = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':
Stream mapping:
Output #0, mp4, to 'out.mp4':
WARNING: library configuration mismatch
Conversion failed!
";
    let fake = FakeFFmpeg::printing(transcript, 69);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().duration(10.0).build();

    let recorder = Recorder::default();
    let err = converter
        .convert(&[fake.input.clone().into()], fake.path("out.mp4"), &recorder)
        .await
        .unwrap_err();

    match err {
        Error::ProcessFailure {
            exit_code,
            last_warning,
        } => {
            assert_eq!(exit_code, 69);
            assert_eq!(last_warning.as_deref(), Some("WARNING: library configuration mismatch"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let events = recorder.events();
    assert!(events.contains(&Recorded::Message("WARNING: library configuration mismatch".into())));
    assert_eq!(
        events.last(),
        Some(&Recorded::Error("Exit code of ffmpeg encoding run is 69".into()))
    );
    assert!(!events.iter().any(|e| matches!(e, Recorded::Complete(_))));
    assert_eq!(
        converter.unhandled_messages(),
        vec![
            "WARNING: library configuration mismatch".to_string(),
            "Conversion failed!".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_configuration_error_starts_nothing() {
    let fake = FakeFFmpeg::new("touch \"$(dirname \"$0\")/ran\"\nexit 0");
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().without_audio().without_video().build();

    let recorder = Recorder::default();
    let err = converter
        .convert(&[fake.input.clone().into()], fake.path("out.mp4"), &recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert!(matches!(recorder.events().as_slice(), [Recorded::Error(_)]));
    assert!(!fake.exists("ran"), "ffmpeg must not be started");
}

#[tokio::test]
async fn test_missing_input_is_reported() {
    let fake = FakeFFmpeg::printing(CONVERSION_TRANSCRIPT, 0);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let recorder = Recorder::default();
    let err = converter
        .convert(&[fake.path("missing.mp4").into()], fake.path("out.mp4"), &recorder)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InputNotFound { .. }));
    assert!(matches!(recorder.events().as_slice(), [Recorded::Error(_)]));
}

#[tokio::test]
async fn test_started_conversion_streams_events() {
    let fake = FakeFFmpeg::printing(CONVERSION_TRANSCRIPT, 0);
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().duration(10.0).build();

    let mut handle = converter.start(vec![fake.input.clone().into()], fake.path("out.mp4"));
    let mut progress = Vec::new();
    let mut completion = None;
    while let Some(event) = handle.events().next().await {
        match event {
            ConversionEvent::Progress(p) => progress.push(p),
            ConversionEvent::Completed(c) => completion = Some(c),
            ConversionEvent::Failed(failure) => panic!("conversion failed: {failure:?}"),
            _ => {}
        }
    }

    assert_eq!(progress, vec![50, 100]);
    assert_eq!(completion, Some(Completion::Completed));
}

#[tokio::test]
async fn test_abort_running_conversion() {
    let fake = FakeFFmpeg::new("echo \"Input #0, mp4, from 'in.mp4':\" >&2\nexec sleep 30");
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let mut handle = converter.start(vec![fake.input.clone().into()], fake.path("out.mp4"));
    let mut events = handle.events();
    let first = events.next().await;
    assert!(matches!(first, Some(ConversionEvent::Started(_))));

    converter.abort();

    let next = tokio::time::timeout(Duration::from_secs(10), events.next())
        .await
        .expect("abort did not end the conversion");
    assert!(matches!(next, Some(ConversionEvent::Completed(Completion::Aborted))));
}

#[tokio::test]
async fn test_abort_while_source_is_described() {
    // The description of the source never arrives.
    let fake = FakeFFmpeg::new("exec sleep 30");
    let script = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
exec sleep 30
"#;
    std::fs::write(&fake.executable, script).unwrap();
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let mut handle = converter.start(vec![fake.input.clone().into()], fake.path("out.mp4"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    converter.abort();

    let mut events = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = handle.events().next().await {
            events.push(event);
        }
    });
    finished.await.expect("abort did not end the conversion");

    assert!(matches!(
        events.as_slice(),
        [ConversionEvent::Completed(Completion::Aborted)]
    ));
}

#[tokio::test]
async fn test_abort_through_handle() {
    let fake = FakeFFmpeg::new("exec sleep 30");
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let mut handle = converter.start(vec![fake.input.clone().into()], fake.path("out.mp4"));
    handle.abort();

    let mut completion = None;
    let events = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = handle.events().next().await {
            if let ConversionEvent::Completed(c) = event {
                completion = Some(c);
            }
        }
    });
    events.await.expect("abort did not end the conversion");
    assert_eq!(completion, Some(Completion::Aborted));
}

#[tokio::test]
async fn test_conversions_on_one_converter_are_serialized() {
    let fake = FakeFFmpeg::new(
        "dir=\"$(dirname \"$0\")\"\n\
         [ -e \"$dir/busy\" ] && touch \"$dir/overlap\"\n\
         touch \"$dir/busy\"\n\
         sleep 1\n\
         rm -f \"$dir/busy\"\n\
         exit 0",
    );
    let ffmpeg = FFmpeg::new_with_path(&fake.executable).await.unwrap();
    let converter = ffmpeg.converter().build();

    let sources: Vec<MediaSource> = vec![fake.input.clone().into()];
    let mut first = converter.start(sources.clone(), fake.path("a.mp4"));
    let mut second = converter.clone().start(sources, fake.path("b.mp4"));

    for handle in [&mut first, &mut second] {
        while let Some(event) = handle.events().next().await {
            if let ConversionEvent::Failed(failure) = event {
                panic!("conversion failed: {failure:?}");
            }
        }
    }
    assert!(!fake.exists("overlap"), "conversions ran concurrently");
}
