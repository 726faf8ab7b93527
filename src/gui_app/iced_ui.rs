use std::path::PathBuf;
use std::sync::Arc;

use iced::mouse::Cursor;
use iced::widget::canvas::{self, Canvas, Frame, Geometry, Program, event};
use iced::widget::{button, checkbox, column, container, row, stack, text};
use iced::{
    Color, Element, Length, Point, Rectangle, Size, Subscription, Task, Theme, keyboard, mouse,
    window,
};

use crate::api::{PainterClient, SessionId};
use crate::compositor::{OverlayRaster, composite_overlay};
use crate::config::BackendConfig;
use crate::datauri::{decode_base64_payload, encode_data_uri};
use crate::gui_app::viewer::{FitTransform, flatten_onto};
use crate::masks::{Dimensions, MaskStore};
use crate::selection::{ClickModifier, Rgb, SelectionState};

/// Palette offered for painting, matching the backend's preview colors.
const PALETTE: [Rgb; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

pub fn run_iced_app() -> iced::Result {
    iced::application("Building Painter", PainterApp::update, PainterApp::view)
        .subscription(PainterApp::subscription)
        .theme(PainterApp::theme)
        .antialiasing(false)
        .window(window::Settings {
            size: Size::new(1100.0, 720.0),
            ..Default::default()
        })
        .run_with(PainterApp::new)
}

pub struct PainterApp {
    client: Option<PainterClient>,
    session: Option<SessionId>,
    store: Arc<MaskStore>,
    selection: SelectionState,
    show_all: bool,
    active_color: Rgb,
    photo: Option<Photo>,
    upload_uri: Option<String>,
    overlay: Option<Overlay>,
    /// Stamp for composite passes; a finished pass with an older stamp is a
    /// stale render and must not replace a newer raster.
    render_seq: u64,
    /// True while a resolver call is outstanding. Clicks are ignored, not
    /// queued, and the action buttons are disabled.
    busy: bool,
    status_text: String,
    shift_down: bool,
    photo_cache: canvas::Cache,
}

struct Photo {
    handle: iced::widget::image::Handle,
    pixels: Vec<u8>,
    dimensions: Dimensions,
}

struct Overlay {
    handle: iced::widget::image::Handle,
    raster: OverlayRaster,
}

#[derive(Debug, Clone)]
enum Message {
    OpenPhotoPressed,
    FilePicked(Option<PathBuf>),
    PhotoLoaded(Result<UploadedPhoto, String>),
    MasksGenerated(Result<MaskSeed, String>),
    CanvasClicked {
        cursor: Point,
        bounds: Size,
        modifier: ClickModifier,
    },
    PointResolved {
        modifier: ClickModifier,
        result: Result<Vec<usize>, String>,
    },
    OverlayReady {
        seq: u64,
        result: Result<OverlayRaster, String>,
    },
    ShowAllToggled(bool),
    ColorPicked(Rgb),
    ApplyPressed,
    ColorsApplied {
        /// The color sent to the backend, captured at request time. The
        /// active palette color may change while the call is in flight and
        /// must not leak into the applied map.
        color: Rgb,
        result: Result<DecodedPhoto, String>,
    },
    SavePressed,
    SaveTargetPicked(Option<PathBuf>),
    PhotoSaved(Result<PathBuf, String>),
    ShiftChanged(bool),
}

#[derive(Debug, Clone)]
struct UploadedPhoto {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    data_uri: String,
}

#[derive(Debug, Clone)]
struct DecodedPhoto {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
struct MaskSeed {
    store: MaskStore,
}

impl PainterApp {
    fn new() -> (Self, Task<Message>) {
        let (client, status_text) = match BackendConfig::from_env() {
            Ok(config) => (
                Some(PainterClient::new(config)),
                "Open a building photo to begin".to_string(),
            ),
            Err(err) => {
                log::warn!("backend not configured: {err}");
                (None, format!("Backend not configured: {err}"))
            }
        };

        (
            PainterApp {
                client,
                session: None,
                store: Arc::new(MaskStore::default()),
                selection: SelectionState::new(),
                show_all: false,
                active_color: PALETTE[0],
                photo: None,
                upload_uri: None,
                overlay: None,
                render_seq: 0,
                busy: false,
                status_text,
                shift_down: false,
                photo_cache: canvas::Cache::default(),
            },
            Task::none(),
        )
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenPhotoPressed => {
                if self.busy {
                    return Task::none();
                }

                let dialog = rfd::AsyncFileDialog::new()
                    .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "webp"])
                    .pick_file();

                Task::perform(dialog, |result| {
                    Message::FilePicked(result.map(|file| file.path().to_path_buf()))
                })
            }
            Message::FilePicked(Some(path)) => {
                // A fresh upload invalidates every index-keyed structure
                // before any response can land; stale indices must never
                // leak into the new collection.
                self.session = None;
                self.store = Arc::new(MaskStore::default());
                self.selection.reset();
                self.overlay = None;
                self.render_seq += 1;
                self.busy = true;
                self.status_text = format!("Loading {}", path.display());
                Task::perform(load_photo_task(path), Message::PhotoLoaded)
            }
            Message::FilePicked(None) => Task::none(),
            Message::PhotoLoaded(Ok(upload)) => {
                let dimensions = Dimensions::new(upload.width, upload.height);
                self.set_photo(upload.pixels, dimensions);
                self.upload_uri = Some(upload.data_uri.clone());

                let Some(client) = self.client.clone() else {
                    self.busy = false;
                    self.status_text = "Backend not configured, masks unavailable".to_string();
                    return Task::none();
                };

                let session = SessionId::generate();
                self.session = Some(session.clone());
                self.status_text = "Generating region masks...".to_string();
                Task::perform(
                    generate_masks_task(client, upload.data_uri, session),
                    Message::MasksGenerated,
                )
            }
            Message::PhotoLoaded(Err(error)) => {
                self.busy = false;
                self.status_text = format!("Failed to load photo: {error}");
                Task::none()
            }
            Message::MasksGenerated(Ok(seed)) => {
                self.busy = false;
                self.status_text = format!("{} regions detected", seed.store.len());
                log::info!("mask store loaded with {} regions", seed.store.len());
                self.store = Arc::new(seed.store);
                self.recomposite()
            }
            Message::MasksGenerated(Err(error)) => {
                // Store and selection were cleared at upload time; leave
                // them empty rather than committing a partial result.
                self.busy = false;
                self.status_text = format!("Mask generation failed: {error}");
                log::warn!("generate-masks failed: {error}");
                Task::none()
            }
            Message::CanvasClicked {
                cursor,
                bounds,
                modifier,
            } => self.handle_canvas_click(cursor, bounds, modifier),
            Message::PointResolved { modifier, result } => {
                self.busy = false;
                match result {
                    Ok(indices) => {
                        self.selection.resolve_click(&indices, modifier);
                        self.status_text = format!(
                            "Selected: {}  Applied: {}",
                            self.selection.pending().len(),
                            self.selection.applied().len()
                        );
                        self.recomposite()
                    }
                    Err(error) => {
                        self.status_text = format!("Point lookup failed: {error}");
                        log::warn!("get-mask-at-point failed: {error}");
                        Task::none()
                    }
                }
            }
            Message::OverlayReady { seq, result } => {
                if seq != self.render_seq {
                    // Superseded by a newer composite pass.
                    return Task::none();
                }
                match result {
                    Ok(raster) => {
                        self.overlay = Some(Overlay {
                            handle: iced::widget::image::Handle::from_rgba(
                                raster.width,
                                raster.height,
                                raster.pixels.clone(),
                            ),
                            raster,
                        });
                    }
                    Err(error) => {
                        log::warn!("composite pass failed: {error}");
                    }
                }
                Task::none()
            }
            Message::ShowAllToggled(value) => {
                if self.busy {
                    return Task::none();
                }
                self.show_all = value;
                self.recomposite()
            }
            Message::ColorPicked(color) => {
                if self.busy {
                    return Task::none();
                }
                self.active_color = color;
                self.recomposite()
            }
            Message::ApplyPressed => {
                if self.busy || self.selection.pending().is_empty() || self.upload_uri.is_none() {
                    return Task::none();
                }
                let (Some(client), Some(session)) = (self.client.clone(), self.session.clone())
                else {
                    return Task::none();
                };

                self.busy = true;
                self.status_text = "Applying color...".to_string();
                let indices = self.selection.pending_indices();
                let color = self.active_color;
                Task::perform(
                    apply_colors_task(client, session, indices, color),
                    move |result| Message::ColorsApplied { color, result },
                )
            }
            Message::ColorsApplied {
                color,
                result: Ok(base),
            } => {
                self.busy = false;
                let dimensions = Dimensions::new(base.width, base.height);
                self.set_photo(base.pixels, dimensions);
                // Commit the color the server actually painted, not
                // whatever the palette points at by response time.
                self.selection.commit(color);
                self.status_text = format!(
                    "Color applied, {} regions painted",
                    self.selection.applied().len()
                );
                self.recomposite()
            }
            Message::ColorsApplied {
                result: Err(error), ..
            } => {
                // Neither the selection nor the base image changes on a
                // failed commit.
                self.busy = false;
                self.status_text = format!("Apply failed: {error}");
                log::warn!("apply-colors failed: {error}");
                Task::none()
            }
            Message::SavePressed => {
                if self.busy || self.photo.is_none() {
                    return Task::none();
                }
                let dialog = rfd::AsyncFileDialog::new()
                    .add_filter("PNG image", &["png"])
                    .set_file_name("colored-building.png")
                    .save_file();
                Task::perform(dialog, |result| {
                    Message::SaveTargetPicked(result.map(|file| file.path().to_path_buf()))
                })
            }
            Message::SaveTargetPicked(Some(path)) => {
                let Some(photo) = &self.photo else {
                    return Task::none();
                };
                let pixels = photo.pixels.clone();
                let dimensions = photo.dimensions;
                let overlay = self.overlay.as_ref().map(|overlay| overlay.raster.clone());
                Task::perform(
                    save_png_task(path, pixels, overlay, dimensions),
                    Message::PhotoSaved,
                )
            }
            Message::SaveTargetPicked(None) => Task::none(),
            Message::PhotoSaved(Ok(path)) => {
                self.status_text = format!("Saved {}", path.display());
                Task::none()
            }
            Message::PhotoSaved(Err(error)) => {
                self.status_text = format!("Save failed: {error}");
                log::warn!("png export failed: {error}");
                Task::none()
            }
            Message::ShiftChanged(down) => {
                self.shift_down = down;
                Task::none()
            }
        }
    }

    fn handle_canvas_click(
        &mut self,
        cursor: Point,
        bounds: Size,
        modifier: ClickModifier,
    ) -> Task<Message> {
        if self.busy || self.photo.is_none() {
            return Task::none();
        }
        // No session means masks were never generated for this photo; the
        // click is a user-recoverable precondition failure, dropped quietly.
        let (Some(client), Some(session)) = (self.client.clone(), self.session.clone()) else {
            return Task::none();
        };

        let dimensions = self.dimensions();
        let Some(fit) = FitTransform::compute(dimensions, bounds.width, bounds.height) else {
            return Task::none();
        };
        let Some((x, y)) = fit.to_image_pixel(dimensions, cursor.x, cursor.y) else {
            return Task::none();
        };

        self.busy = true;
        Task::perform(
            async move {
                client
                    .mask_at_point(x, y, &session)
                    .await
                    .map_err(|err| err.to_string())
            },
            move |result| Message::PointResolved { modifier, result },
        )
    }

    fn set_photo(&mut self, pixels: Vec<u8>, dimensions: Dimensions) {
        self.photo = Some(Photo {
            handle: iced::widget::image::Handle::from_rgba(
                dimensions.width,
                dimensions.height,
                pixels.clone(),
            ),
            pixels,
            dimensions,
        });
        self.photo_cache.clear();
    }

    /// Canonical dimensions come from the mask response once it arrives;
    /// before that, the locally decoded photo size is authoritative.
    fn dimensions(&self) -> Dimensions {
        if self.store.is_empty() {
            self.photo
                .as_ref()
                .map(|photo| photo.dimensions)
                .unwrap_or_default()
        } else {
            self.store.dimensions()
        }
    }

    /// Kick off a composite pass on a blocking task. Bumping the sequence
    /// first means any still-running older pass lands stale and is dropped.
    fn recomposite(&mut self) -> Task<Message> {
        self.render_seq += 1;
        let seq = self.render_seq;

        if self.store.is_empty() {
            self.overlay = None;
            return Task::none();
        }

        let store = Arc::clone(&self.store);
        let selection = self.selection.clone();
        let show_all = self.show_all;
        let color = self.active_color;

        Task::perform(
            async move {
                tokio::task::spawn_blocking(move || {
                    composite_overlay(&store, &selection, show_all, color)
                })
                .await
                .map_err(|err| err.to_string())
            },
            move |result| Message::OverlayReady { seq, result },
        )
    }

    fn view(&self) -> Element<'_, Message> {
        row![self.viewer_section(), self.controls_section()]
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn viewer_section(&self) -> Element<'_, Message> {
        // Photo canvas below, overlay canvas on top; both use the same fit
        // transform so the overlay and click targeting stay registered.
        let photo_canvas = Canvas::new(PhotoLayer(self))
            .width(Length::Fill)
            .height(Length::Fill);

        let overlay_canvas = Canvas::new(OverlayLayer(self))
            .width(Length::Fill)
            .height(Length::Fill);

        let stacked = stack![
            container(photo_canvas)
                .width(Length::Fill)
                .height(Length::Fill)
                .clip(true),
            overlay_canvas
        ];

        container(stacked)
            .width(Length::Fill)
            .height(Length::Fill)
            .clip(true)
            .style(|_| container::Style {
                background: Some(Color::from_rgb8(24, 24, 24).into()),
                ..Default::default()
            })
            .into()
    }

    fn controls_section(&self) -> Element<'_, Message> {
        let open_button: Element<'_, Message> = if self.busy {
            button(text("Working...")).width(Length::Fill).into()
        } else {
            button(text("Open Photo"))
                .on_press(Message::OpenPhotoPressed)
                .width(Length::Fill)
                .into()
        };

        let show_all = checkbox("Show all regions", self.show_all)
            .on_toggle(Message::ShowAllToggled)
            .size(18);

        let counters = text(format!(
            "Selected: {}   Applied: {}",
            self.selection.pending().len(),
            self.selection.applied().len()
        ))
        .size(14);

        let palette = row(PALETTE.map(|color| self.swatch(color))).spacing(8);

        let can_apply = !self.busy && !self.selection.pending().is_empty();
        let apply_button: Element<'_, Message> = if can_apply {
            button(text("Apply Color"))
                .on_press(Message::ApplyPressed)
                .width(Length::Fill)
                .into()
        } else {
            button(text("Apply Color")).width(Length::Fill).into()
        };

        let can_save = !self.busy && self.photo.is_some();
        let save_button: Element<'_, Message> = if can_save {
            button(text("Save PNG"))
                .on_press(Message::SavePressed)
                .width(Length::Fill)
                .into()
        } else {
            button(text("Save PNG")).width(Length::Fill).into()
        };

        let status = container(text(&self.status_text).size(12))
            .padding(8)
            .width(Length::Fill)
            .style(|_| container::Style {
                background: None,
                border: iced::border::Border {
                    color: Color::from_rgb8(100, 100, 100),
                    width: 1.0,
                    radius: 4.0.into(),
                },
                ..Default::default()
            });

        let hints = text(
            "Click a wall to select it\n\
             Shift+click adds to the selection\n\
             Right click removes from it\n\
             Clicking a painted wall re-opens it",
        )
        .size(12);

        let controls = column![
            open_button,
            show_all,
            counters,
            palette,
            apply_button,
            save_button,
            status,
            hints,
        ]
        .spacing(16)
        .width(Length::Fill);

        container(controls)
            .width(Length::Fixed(260.0))
            .height(Length::Fill)
            .padding(20)
            .style(|_| container::Style {
                background: Some(Color::from_rgb8(32, 32, 32).into()),
                ..Default::default()
            })
            .into()
    }

    fn swatch(&self, color: Rgb) -> Element<'_, Message> {
        let fill = Color::from_rgb8(color[0], color[1], color[2]);
        let selected = color == self.active_color;
        let border_color = if selected {
            Color::WHITE
        } else {
            Color::from_rgb8(70, 70, 70)
        };

        button(text(""))
            .width(Length::Fixed(28.0))
            .height(Length::Fixed(28.0))
            .on_press(Message::ColorPicked(color))
            .style(move |_, _| button::Style {
                background: Some(fill.into()),
                border: iced::border::Border {
                    color: border_color,
                    width: if selected { 2.0 } else { 1.0 },
                    radius: 6.0.into(),
                },
                ..button::Style::default()
            })
            .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::none()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

// Bottom layer: the base photo, fit-scaled and centered, cached until the
// photo changes.
struct PhotoLayer<'a>(&'a PainterApp);

impl<'a> Program<Message> for PhotoLayer<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<Geometry> {
        let app = self.0;
        let layer = app.photo_cache.draw(renderer, bounds.size(), |frame| {
            frame.fill_rectangle(Point::ORIGIN, bounds.size(), Color::from_rgb8(18, 18, 18));

            if let Some(photo) = &app.photo {
                if let Some(dest) = fit_dest_rect(photo.dimensions, bounds.size()) {
                    frame.draw_image(
                        dest,
                        canvas::Image::new(photo.handle.clone())
                            .filter_method(iced::widget::image::FilterMethod::Nearest),
                    );
                }
            } else {
                frame.fill_text(canvas::Text {
                    content: "No photo loaded".to_string(),
                    position: Point::new(bounds.width / 2.0 - 60.0, bounds.height / 2.0),
                    color: Color::from_rgb8(200, 200, 200),
                    ..Default::default()
                });
            }
        });

        vec![layer]
    }
}

// Top layer: the composited region overlay, plus all pointer and keyboard
// handling.
struct OverlayLayer<'a>(&'a PainterApp);

impl<'a> Program<Message> for OverlayLayer<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<Geometry> {
        let app = self.0;
        let mut frame = Frame::new(renderer, bounds.size());

        if let Some(overlay) = &app.overlay {
            if let Some(dest) = fit_dest_rect(app.dimensions(), bounds.size()) {
                frame.draw_image(
                    dest,
                    canvas::Image::new(overlay.handle.clone())
                        .filter_method(iced::widget::image::FilterMethod::Nearest),
                );
            }
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        _state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (event::Status, Option<Message>) {
        let app = self.0;
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(button)) => {
                let modifier = match button {
                    mouse::Button::Left if app.shift_down => ClickModifier::Add,
                    mouse::Button::Left => ClickModifier::Replace,
                    mouse::Button::Right => ClickModifier::Remove,
                    _ => return (event::Status::Ignored, None),
                };

                if let Some(position) = cursor.position_in(bounds) {
                    (
                        event::Status::Captured,
                        Some(Message::CanvasClicked {
                            cursor: position,
                            bounds: bounds.size(),
                            modifier,
                        }),
                    )
                } else {
                    (event::Status::Ignored, None)
                }
            }
            canvas::Event::Keyboard(keyboard::Event::KeyPressed { key, .. }) => {
                if matches!(key, keyboard::Key::Named(keyboard::key::Named::Shift)) {
                    (event::Status::Captured, Some(Message::ShiftChanged(true)))
                } else {
                    (event::Status::Ignored, None)
                }
            }
            canvas::Event::Keyboard(keyboard::Event::KeyReleased { key, .. }) => {
                if matches!(key, keyboard::Key::Named(keyboard::key::Named::Shift)) {
                    (event::Status::Captured, Some(Message::ShiftChanged(false)))
                } else {
                    (event::Status::Ignored, None)
                }
            }
            _ => (event::Status::Ignored, None),
        }
    }
}

fn fit_dest_rect(dimensions: Dimensions, bounds: Size) -> Option<Rectangle> {
    let fit = FitTransform::compute(dimensions, bounds.width, bounds.height)?;
    let (width, height) = fit.rendered_size(dimensions);
    Some(Rectangle::new(
        Point::new(fit.offset_x, fit.offset_y),
        Size::new(width, height),
    ))
}

async fn load_photo_task(path: PathBuf) -> Result<UploadedPhoto, String> {
    let bytes = tokio::fs::read(&path).await.map_err(|err| err.to_string())?;
    tokio::task::spawn_blocking(move || {
        let format = image::guess_format(&bytes).map_err(|err| err.to_string())?;
        let decoded = image::load_from_memory(&bytes).map_err(|err| err.to_string())?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data_uri = encode_data_uri(format.to_mime_type(), &bytes);
        Ok(UploadedPhoto {
            width,
            height,
            pixels: rgba.into_raw(),
            data_uri,
        })
    })
    .await
    .map_err(|err| err.to_string())?
}

async fn generate_masks_task(
    client: PainterClient,
    data_uri: String,
    session: SessionId,
) -> Result<MaskSeed, String> {
    let response = client
        .generate_masks(&data_uri, &session)
        .await
        .map_err(|err| err.to_string())?;

    tokio::task::spawn_blocking(move || {
        let dimensions = Dimensions::new(response.width, response.height);
        let store = MaskStore::from_payloads(&response.masks, dimensions);
        Ok(MaskSeed { store })
    })
    .await
    .map_err(|err| err.to_string())?
}

async fn apply_colors_task(
    client: PainterClient,
    session: SessionId,
    indices: Vec<usize>,
    color: Rgb,
) -> Result<DecodedPhoto, String> {
    let data_uri = client
        .apply_colors(&session, &indices, color)
        .await
        .map_err(|err| err.to_string())?;

    tokio::task::spawn_blocking(move || {
        let bytes = decode_base64_payload(&data_uri).map_err(|err| err.to_string())?;
        let rgba = image::load_from_memory(&bytes)
            .map_err(|err| err.to_string())?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(DecodedPhoto {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    })
    .await
    .map_err(|err| err.to_string())?
}

async fn save_png_task(
    path: PathBuf,
    base_pixels: Vec<u8>,
    overlay: Option<OverlayRaster>,
    dimensions: Dimensions,
) -> Result<PathBuf, String> {
    tokio::task::spawn_blocking(move || {
        let flattened = match &overlay {
            Some(raster) => flatten_onto(&base_pixels, raster, dimensions),
            None => base_pixels,
        };
        let buffer = image::RgbaImage::from_raw(dimensions.width, dimensions.height, flattened)
            .ok_or_else(|| "canvas buffer has wrong size".to_string())?;
        buffer
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|err| err.to_string())?;
        Ok(path)
    })
    .await
    .map_err(|err| err.to_string())?
}
