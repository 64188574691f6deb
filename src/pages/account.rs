use eframe::egui;

use super::{AsyncSlot, PageCtx, busy, error_label, pick_file};
use crate::auth::{ProfilePatch, User};
use crate::error::{ApiError, UploadFlowError};
use crate::router::Route;
use crate::upload::SelectedFile;

const AVATAR_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Default)]
pub struct AccountPage {
    form: Option<ProfileForm>,
    profile_save: AsyncSlot<Result<User, ApiError>>,
    avatar_pick: AsyncSlot<Option<SelectedFile>>,
    avatar_upload: AsyncSlot<Result<String, UploadFlowError>>,
    delete: AsyncSlot<Result<(), ApiError>>,
    signing_out: AsyncSlot<()>,
    confirm_delete: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ProfileForm {
    username: String,
    display_name: String,
    bio: String,
}

impl ProfileForm {
    fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name.clone().unwrap_or_default(),
            bio: user.bio.clone().unwrap_or_default(),
        }
    }

    /// Only the fields that differ from `user`.
    fn patch(&self, user: &User) -> ProfilePatch {
        let changed = |new: &str, old: Option<&str>| {
            (new.trim() != old.unwrap_or_default()).then(|| new.trim().to_string())
        };
        ProfilePatch {
            username: changed(&self.username, Some(&user.username)),
            display_name: changed(&self.display_name, user.display_name.as_deref()),
            bio: changed(&self.bio, user.bio.as_deref()),
        }
    }
}

impl AccountPage {
    fn save_profile(&mut self, ctx: &PageCtx<'_>) {
        let (Some(form), Some(user)) = (&self.form, ctx.auth.user()) else {
            return;
        };
        let patch = form.patch(&user);
        if patch == ProfilePatch::default() {
            ctx.toasts.info("Nothing to save");
            return;
        }
        let auth = ctx.auth.clone();
        self.profile_save
            .start(async move { auth.update_profile(&patch).await });
    }

    /// Rejections happen inside `upload_avatar` before any request and come
    /// back as a toast.
    fn upload_avatar(&mut self, file: SelectedFile, ctx: &PageCtx<'_>) {
        let auth = ctx.auth.clone();
        self.avatar_upload
            .start(async move { auth.upload_avatar(file).await });
    }

    fn update(&mut self, ctx: &mut PageCtx<'_>) {
        if self.form.is_none() {
            self.form = ctx.auth.user().as_ref().map(ProfileForm::from_user);
        }
        match self.profile_save.poll() {
            Some(Ok(user)) => {
                self.form = Some(ProfileForm::from_user(&user));
                ctx.toasts.success("Profile saved");
            }
            Some(Err(e)) => ctx.toasts.error(format!("Could not save profile: {e}")),
            None => {}
        }
        if let Some(Some(file)) = self.avatar_pick.poll() {
            self.upload_avatar(file, ctx);
        }
        match self.avatar_upload.poll() {
            Some(Ok(_)) => ctx.toasts.success("Avatar updated"),
            Some(Err(UploadFlowError::Rejected(e))) => ctx.toasts.error(e.to_string()),
            Some(Err(e)) => ctx.toasts.error(format!("Avatar upload failed: {e}")),
            None => {}
        }
        match self.delete.poll() {
            Some(Ok(())) => {
                ctx.toasts.info("Your account has been deleted");
                ctx.go(Route::Home);
            }
            Some(Err(e)) => self.error = Some(e.to_string()),
            None => {}
        }
        if self.signing_out.poll().is_some() {
            ctx.go(Route::Home);
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, ctx: &mut PageCtx<'_>) {
        self.update(ctx);
        let Some(user) = ctx.auth.user() else {
            busy(ui, "Loading account…");
            return;
        };

        ui.heading("Account");
        ui.horizontal(|ui| {
            ui.label(user.label());
            ui.weak(&user.email);
            if user.is_verified {
                ui.weak("(verified)");
            }
        });
        if let Some(url) = ctx.auth.cached_avatar_url() {
            ui.hyperlink_to("Current avatar", url);
        }
        ui.horizontal(|ui| {
            if self.avatar_upload.is_running() {
                busy(ui, "Uploading avatar…");
            } else if ui.button("Change avatar…").clicked() {
                pick_file(&mut self.avatar_pick, "Images", AVATAR_EXTENSIONS);
            }
        });
        ui.separator();

        if let Some(form) = &mut self.form {
            egui::Grid::new("profile").num_columns(2).show(ui, |ui| {
                ui.label("Username");
                ui.text_edit_singleline(&mut form.username);
                ui.end_row();
                ui.label("Display name");
                ui.text_edit_singleline(&mut form.display_name);
                ui.end_row();
                ui.label("Bio");
                ui.text_edit_multiline(&mut form.bio);
                ui.end_row();
            });
        }
        if self.profile_save.is_running() {
            busy(ui, "Saving…");
        } else if ui.button("Save profile").clicked() {
            self.save_profile(ctx);
        }
        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Sign out").clicked() && !self.signing_out.is_running() {
                let auth = ctx.auth.clone();
                self.signing_out.start(async move { auth.logout().await });
            }
            if !self.confirm_delete {
                if ui.button("Delete account").clicked() {
                    self.confirm_delete = true;
                }
            } else {
                ui.colored_label(ui.visuals().warn_fg_color, "This cannot be undone.");
                if ui.button("Delete permanently").clicked() {
                    let auth = ctx.auth.clone();
                    self.delete.start(async move { auth.delete_account().await });
                    self.confirm_delete = false;
                }
                if ui.button("Cancel").clicked() {
                    self.confirm_delete = false;
                }
            }
        });
        if let Some(error) = &self.error {
            error_label(ui, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use crate::http::{ApiResponse, Method, RequestBody};
    use crate::pages::testing::Harness;
    use crate::toast::ToastKind;
    use crate::task;
    use serde_json::json;

    fn me() -> serde_json::Value {
        json!({ "id": 1, "email": "ann@example.com", "username": "ann", "bio": "hi" })
    }

    fn signed_in(transport: std::rc::Rc<ScriptedTransport>) -> Harness {
        let harness = Harness::new(transport);
        harness
            .auth
            .set_auth(Some(serde_json::from_value(me()).unwrap()), None);
        harness
    }

    #[test]
    fn non_image_avatar_raises_toast_without_request() {
        let transport = ScriptedTransport::new(|_| panic!("no request expected"));
        let mut harness = signed_in(transport);
        let mut page = AccountPage::default();

        page.upload_avatar(SelectedFile::from_name("resume.pdf", b"%PDF-1.7".to_vec()), &harness.ctx());
        task::pump();
        page.update(&mut harness.ctx());

        assert_eq!(harness.transport.total(), 0);
        let toasts = harness.toasts.snapshot();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].text, "resume.pdf is not an image");
    }

    #[test]
    fn profile_patch_sends_only_changes() {
        let transport = ScriptedTransport::new(|req| {
            let RequestBody::Json(body) = &req.body else {
                return Ok(ApiResponse::new(400, ""));
            };
            let mut user = me();
            user["display_name"] = body["display_name"].clone();
            Ok(ApiResponse::json(200, &user))
        });
        let mut harness = signed_in(transport);
        let mut page = AccountPage::default();
        page.update(&mut harness.ctx());

        page.save_profile(&harness.ctx());
        assert_eq!(harness.transport.total(), 0, "unchanged form is not sent");

        page.form.as_mut().unwrap().display_name = "Ann Maker".into();
        page.save_profile(&harness.ctx());
        task::pump();
        page.update(&mut harness.ctx());

        let sent = harness.transport.requests.borrow();
        assert_eq!(sent[0].method, Method::Patch);
        assert_eq!(sent[0].body, RequestBody::Json(json!({ "display_name": "Ann Maker" })));
        drop(sent);
        assert_eq!(harness.auth.user().unwrap().label(), "Ann Maker");
    }

    #[test]
    fn sign_out_returns_home_even_offline() {
        let transport = ScriptedTransport::new(|_| Err(ApiError::Network("offline".into())));
        let mut harness = signed_in(transport);
        let mut page = AccountPage::default();
        let auth = harness.auth.clone();
        page.signing_out.start(async move { auth.logout().await });
        task::pump();

        let mut ctx = harness.ctx();
        page.update(&mut ctx);
        assert_eq!(ctx.navigate, Some(Route::Home));
        drop(ctx);
        assert!(harness.auth.user().is_none());
        assert!(harness.auth.is_resolved());
    }
}
