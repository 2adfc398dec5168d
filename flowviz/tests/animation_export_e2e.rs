use flowviz::config::AnimationConfig;
use flowviz::core_modules::collection::images_to_gray_video;
use flowviz::{ExportPool, FlowAnimation, FlowColorizer, Video, read_flow_collection, read_image_collection, write_flow};
use image::{GrayImage, Luma};
use ndarray::{Array3, s};

fn fixture(dir: &std::path::Path) {
    let images = dir.join("images");
    let flows = dir.join("flows");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::create_dir_all(&flows).unwrap();

    // Three video frames give two flow fields.
    for i in 0..3u8 {
        GrayImage::from_pixel(12, 8, Luma([200]))
            .save(images.join(format!("img_{i}.png")))
            .unwrap();
    }
    for i in 0..2 {
        let mut flow = Array3::<f32>::zeros((8, 12, 2));
        flow[[4, 2, 0]] = 6.0;
        flow[[0, 0, 1]] = f32::NAN;
        write_flow(flows.join(format!("flow_{i}.flo")), flow.view()).unwrap();
    }
}

#[test]
fn vectors_over_video_render_at_scale() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());

    let flows = read_flow_collection(dir.path().join("flows")).unwrap();
    let mut images = read_image_collection(dir.path().join("images"), ".png").unwrap();
    images.truncate(flows.dim().0);
    let video = images_to_gray_video(&images).unwrap();

    let config = AnimationConfig { scale: 2.0, arrow_color: [255, 0, 0], ..AnimationConfig::default() };
    let animation = FlowAnimation::new(Video::Gray(video), &config)
        .unwrap()
        .with_vectors(flows)
        .unwrap();

    let rgba = animation.to_rgba().unwrap();
    assert_eq!(rgba.dim(), (2, 16, 24, 4));
    // Background is the gray video, opaque.
    assert_eq!(rgba.slice(s![0, 15, 23, ..]).to_vec(), vec![200, 200, 200, 255]);
    // The shaft runs along row 4 in the source, rows 8..10 after scaling.
    let shaft = rgba.slice(s![1, 8..10, 6..16, ..]);
    assert!(shaft.outer_iter().any(|row: ndarray::ArrayView2<u8>| row.outer_iter().filter(|p: &ndarray::ArrayView1<u8>| p[0] == 255 && p[1] == 0).count() >= 8));
    // The NaN vector draws nothing.
    assert_eq!(rgba.slice(s![0, 0, 0, ..]).to_vec(), vec![200, 200, 200, 255]);
}

#[tokio::test]
async fn color_overlay_exports_gif_and_frames() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());

    let flows = read_flow_collection(dir.path().join("flows")).unwrap();
    let images = read_image_collection(dir.path().join("images"), ".png").unwrap();
    let video = images_to_gray_video(&images[..2]).unwrap();
    let colors = FlowColorizer::default().colorize_sequence(&flows, None).unwrap();

    let animation = FlowAnimation::new(Video::Gray(video), &AnimationConfig::default())
        .unwrap()
        .with_video2(colors)
        .unwrap()
        .with_vectors(flows)
        .unwrap();

    let gif = dir.path().join("vectors.gif");
    animation.save_gif(&gif, 5).unwrap();
    assert!(std::fs::read(&gif).unwrap().starts_with(b"GIF89a"));

    let pool = ExportPool::new(2);
    let out = dir.path().join("frames");
    let paths = animation.save_frames(&out, "vectors", &pool).await.unwrap();
    pool.shutdown().await;

    assert_eq!(paths.len(), 2);
    let frame = image::open(&paths[1]).unwrap().to_rgba8();
    assert_eq!(frame.dimensions(), (12, 8));
    // Still samples blend white flow color 50/50 with the gray video.
    assert_eq!(frame.get_pixel(11, 7).0, [228, 228, 228, 255]);
}
