use ffconvert::FFmpeg;

#[tokio::main]
async fn main() {
    println!("ffmpeg version is: {}", FFmpeg::new().await.expect("Failed to find ffmpeg").version());
}
