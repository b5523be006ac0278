use std::mem;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use crossterm::event::KeyCode;
use open::that as open_path;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::account::{save_profile, sign_up};
use crate::catalog::BookingTab;
use crate::config::Config;
use crate::db::{
    cancel_booking, create_booking, fetch_booking, set_booking_status, set_experience_status,
    set_profile_role, set_profile_status,
};
use crate::error::{classify, BackendError, ErrorClass, ValidationError};
use crate::export::export_dashboard;
use crate::itinerary::{generate_itinerary, ItineraryOutcome};
use crate::listing::publish_experience;
use crate::models::{
    AccountStatus, BookingStatus, Experience, ExperienceStatus, Product, Profile, Role,
};
use crate::realtime::{ChangeFeed, RowChange, Table, JOURNAL_RETENTION_HOURS};
use crate::session::Session;
use crate::storage::LocalMediaStore;

use super::forms::{Confirm, ConfirmAction, Form, SearchState};
use super::helpers::{
    account_status_style, bar, booking_status_style, centered_rect, experience_status_style,
    format_money, key_hint, surface_error,
};
use super::screens::{
    BookingsScreen, DashboardScreen, ExperiencesScreen, ItineraryScreen, ManageBookingsScreen,
    ManageExperiencesScreen, ManageUsersScreen, MarketplaceScreen, Selection,
};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows jumped by PageUp/PageDown.
const PAGE: isize = 5;
/// How often a running session trims the change journal.
const JOURNAL_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Width of the trend bars on the dashboard.
const BAR_WIDTH: usize = 24;
/// Number keys and the screens they open, shown in the header.
const NAVIGATION: [(char, &str); 10] = [
    ('1', "Home"),
    ('2', "Experiences"),
    ('3', "Marketplace"),
    ('4', "My bookings"),
    ('5', "Itinerary"),
    ('6', "Host"),
    ('7', "Moderation"),
    ('8', "Users"),
    ('9', "All bookings"),
    ('0', "Dashboard"),
];

/// High-level navigation states. Each list screen owns its data and its live
/// subscription; leaving a screen drops both.
enum Screen {
    Home,
    Experiences(ExperiencesScreen),
    Marketplace(MarketplaceScreen),
    MyBookings(BookingsScreen),
    Itinerary(ItineraryScreen),
    ManageExperiences(ManageExperiencesScreen),
    ManageUsers(ManageUsersScreen),
    ManageBookings(ManageBookingsScreen),
    Dashboard(DashboardScreen),
}

impl Screen {
    fn nav_key(&self) -> char {
        match self {
            Screen::Home => '1',
            Screen::Experiences(_) => '2',
            Screen::Marketplace(_) => '3',
            Screen::MyBookings(_) => '4',
            Screen::Itinerary(_) => '5',
            Screen::ManageExperiences(_) => '7',
            Screen::ManageUsers(_) => '8',
            Screen::ManageBookings(_) => '9',
            Screen::Dashboard(_) => '0',
        }
    }
}

/// What a submitted form does.
enum FormPurpose {
    SignIn,
    SignUp,
    EditProfile,
    CreateExperience,
    Book(Experience),
    PlanItinerary,
}

impl FormPurpose {
    fn title(&self) -> String {
        match self {
            FormPurpose::SignIn => "Sign In".to_string(),
            FormPurpose::SignUp => "Create Account".to_string(),
            FormPurpose::EditProfile => "Edit Profile".to_string(),
            FormPurpose::CreateExperience => "New Experience".to_string(),
            FormPurpose::Book(experience) => format!(
                "Book {} ({} spots left, {} per person)",
                experience.title,
                experience.remaining_capacity(),
                format_money(experience.price)
            ),
            FormPurpose::PlanItinerary => "Plan Itinerary".to_string(),
        }
    }
}

/// Fine-grained modes scoped to the current screen.
enum Mode {
    Normal,
    Editing { purpose: FormPurpose, form: Form },
    Confirming(Confirm),
    Searching(SearchState),
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    conn: Connection,
    config: Config,
    session: Session,
    media: LocalMediaStore,
    feed: ChangeFeed,
    screen: Screen,
    mode: Mode,
    status: Option<StatusMessage>,
    last_prune: Instant,
}

impl App {
    pub fn new(conn: Connection, config: Config, session: Session) -> Result<Self> {
        let feed = ChangeFeed::subscribe(&conn)?;
        let media = LocalMediaStore::new(config.media_dir.clone());
        Ok(Self {
            conn,
            config,
            session,
            media,
            feed,
            screen: Screen::Home,
            mode: Mode::Normal,
            status: None,
            last_prune: Instant::now(),
        })
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mut mode = mem::replace(&mut self.mode, Mode::Normal);

        mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Editing { purpose, form } => self.handle_form(code, purpose, form)?,
            Mode::Confirming(confirm) => self.handle_confirm(code, confirm)?,
            Mode::Searching(state) => self.handle_search(code, state)?,
        };

        self.mode = mode;
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') => {
                *exit = true;
                return Ok(Mode::Normal);
            }
            KeyCode::Esc => {
                if matches!(self.screen, Screen::Home) {
                    *exit = true;
                } else {
                    self.screen = Screen::Home;
                    self.clear_status();
                }
                return Ok(Mode::Normal);
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => {
                return match self.open_screen(ch) {
                    Ok(mode) => Ok(mode),
                    Err(err) => {
                        self.report_error(&err);
                        Ok(Mode::Normal)
                    }
                };
            }
            KeyCode::Char('f') | KeyCode::Char('/') => {
                if let Some(query) = self.query_mut() {
                    let query = query.clone();
                    return Ok(Mode::Searching(SearchState { query }));
                }
            }
            _ => {}
        }

        if self.navigate(code) {
            return Ok(Mode::Normal);
        }

        match self.screen {
            Screen::Home => Ok(self.handle_home_key(code)),
            Screen::Experiences(_) => Ok(self.handle_experiences_key(code)),
            Screen::Marketplace(ref mut market) => {
                match code {
                    KeyCode::Char('c') => market.cycle_category(),
                    KeyCode::Char('a') => market.cycle_artisan(),
                    KeyCode::Char('p') => market.cycle_price_band(),
                    KeyCode::Char('s') => market.cycle_sort(),
                    KeyCode::Char('x') => market.clear_filters(),
                    _ => {}
                }
                Ok(Mode::Normal)
            }
            Screen::MyBookings(_) => Ok(self.handle_my_bookings_key(code)),
            Screen::Itinerary(_) => match code {
                KeyCode::Char('n') => Ok(Mode::Editing {
                    purpose: FormPurpose::PlanItinerary,
                    form: Form::itinerary(self.today()),
                }),
                _ => Ok(Mode::Normal),
            },
            Screen::ManageExperiences(_) => {
                self.handle_moderation_key(code);
                Ok(Mode::Normal)
            }
            Screen::ManageUsers(_) => Ok(self.handle_users_key(code)),
            Screen::ManageBookings(_) => Ok(self.handle_all_bookings_key(code)),
            Screen::Dashboard(_) => {
                self.handle_dashboard_key(code);
                Ok(Mode::Normal)
            }
        }
    }

    /// Switch to the screen bound to a number key. Forms open on top of the
    /// current screen instead.
    fn open_screen(&mut self, key: char) -> Result<Mode> {
        let today = self.today();
        let screen = match key {
            '1' => Screen::Home,
            '2' => Screen::Experiences(ExperiencesScreen::load(&self.conn)?),
            '3' => Screen::Marketplace(MarketplaceScreen::load(&self.conn)?),
            '4' => {
                let user_id = self.session.require_user()?.id;
                Screen::MyBookings(BookingsScreen::load(&self.conn, user_id)?)
            }
            '5' => {
                return Ok(Mode::Editing {
                    purpose: FormPurpose::PlanItinerary,
                    form: Form::itinerary(today),
                })
            }
            '6' => {
                self.session.require_host()?;
                return Ok(Mode::Editing {
                    purpose: FormPurpose::CreateExperience,
                    form: Form::experience(today),
                });
            }
            '7' => {
                self.session.require_admin()?;
                Screen::ManageExperiences(ManageExperiencesScreen::load(&self.conn)?)
            }
            '8' => {
                self.session.require_admin()?;
                Screen::ManageUsers(ManageUsersScreen::load(&self.conn)?)
            }
            '9' => {
                self.session.require_admin()?;
                Screen::ManageBookings(ManageBookingsScreen::load(&self.conn)?)
            }
            '0' => {
                self.session.require_admin()?;
                Screen::Dashboard(DashboardScreen::load(
                    &self.conn,
                    Default::default(),
                    today,
                )?)
            }
            _ => return Ok(Mode::Normal),
        };
        debug!(screen = %key, "screen opened");
        self.screen = screen;
        self.clear_status();
        Ok(Mode::Normal)
    }

    /// Cursor and scroll keys shared by every list and report screen.
    fn navigate(&mut self, code: KeyCode) -> bool {
        let today = self.today();
        let scroll = match &mut self.screen {
            Screen::Dashboard(dashboard) => Some(&mut dashboard.scroll),
            Screen::Itinerary(itinerary) => Some(&mut itinerary.scroll),
            _ => None,
        };
        if let Some(scroll) = scroll {
            match code {
                KeyCode::Up => *scroll = scroll.saturating_sub(1),
                KeyCode::Down => *scroll = scroll.saturating_add(1),
                KeyCode::PageUp => *scroll = scroll.saturating_sub(PAGE as u16),
                KeyCode::PageDown => *scroll = scroll.saturating_add(PAGE as u16),
                KeyCode::Home => *scroll = 0,
                _ => return false,
            }
            return true;
        }

        let Some((selection, len)) = self.selection_mut(today) else {
            return false;
        };
        match code {
            KeyCode::Up => selection.move_by(-1, len),
            KeyCode::Down => selection.move_by(1, len),
            KeyCode::PageUp => selection.move_by(-PAGE, len),
            KeyCode::PageDown => selection.move_by(PAGE, len),
            KeyCode::Home => selection.first(),
            KeyCode::End => selection.last(len),
            _ => return false,
        }
        true
    }

    fn selection_mut(&mut self, today: NaiveDate) -> Option<(&mut Selection, usize)> {
        match &mut self.screen {
            Screen::Experiences(s) => {
                let len = s.visible().len();
                Some((&mut s.selection, len))
            }
            Screen::Marketplace(s) => {
                let len = s.visible().len();
                Some((&mut s.selection, len))
            }
            Screen::MyBookings(s) => {
                let len = s.visible(today).len();
                Some((&mut s.selection, len))
            }
            Screen::ManageExperiences(s) => {
                let len = s.visible().len();
                Some((&mut s.selection, len))
            }
            Screen::ManageUsers(s) => {
                let len = s.visible().len();
                Some((&mut s.selection, len))
            }
            Screen::ManageBookings(s) => {
                let len = s.visible().len();
                Some((&mut s.selection, len))
            }
            Screen::Home | Screen::Itinerary(_) | Screen::Dashboard(_) => None,
        }
    }

    /// The search text of the current screen, for screens that have one.
    fn query_mut(&mut self) -> Option<&mut String> {
        match &mut self.screen {
            Screen::Experiences(s) => Some(&mut s.filter.query),
            Screen::Marketplace(s) => Some(&mut s.filter.query),
            Screen::ManageExperiences(s) => Some(&mut s.filter.query),
            Screen::ManageUsers(s) => Some(&mut s.filter.query),
            _ => None,
        }
    }

    fn handle_home_key(&mut self, code: KeyCode) -> Mode {
        match code {
            KeyCode::Char('i') => Mode::Editing {
                purpose: FormPurpose::SignIn,
                form: Form::sign_in(),
            },
            KeyCode::Char('u') => Mode::Editing {
                purpose: FormPurpose::SignUp,
                form: Form::sign_up(false),
            },
            KeyCode::Char('e') => match self.session.user() {
                Some(user) => Mode::Editing {
                    purpose: FormPurpose::EditProfile,
                    form: Form::profile(user),
                },
                None => {
                    self.set_status("Please sign in first.", StatusKind::Error);
                    Mode::Normal
                }
            },
            KeyCode::Char('o') if self.session.is_signed_in() => Mode::Confirming(Confirm {
                prompt: "Sign out of ThaniLocal?".to_string(),
                action: ConfirmAction::SignOut,
            }),
            _ => Mode::Normal,
        }
    }

    fn handle_experiences_key(&mut self, code: KeyCode) -> Mode {
        let Screen::Experiences(browse) = &self.screen else {
            return Mode::Normal;
        };
        if code != KeyCode::Enter {
            return Mode::Normal;
        }
        let Some(experience) = browse.current().cloned() else {
            self.set_status("No experience selected.", StatusKind::Error);
            return Mode::Normal;
        };
        if let Err(err) = self.session.require_user() {
            self.set_status(err.to_string(), StatusKind::Error);
            return Mode::Normal;
        }
        Mode::Editing {
            form: Form::booking(&experience),
            purpose: FormPurpose::Book(experience),
        }
    }

    fn handle_my_bookings_key(&mut self, code: KeyCode) -> Mode {
        let today = self.today();
        let Screen::MyBookings(bookings) = &mut self.screen else {
            return Mode::Normal;
        };
        match code {
            KeyCode::Tab | KeyCode::BackTab => {
                bookings.toggle_tab();
                Mode::Normal
            }
            KeyCode::Char('-') | KeyCode::Char('c') => {
                let target = bookings.current(today).map(|summary| {
                    (
                        summary.booking.id,
                        summary.booking.status,
                        format!(
                            "Cancel your booking for {} on {}?",
                            summary.experience_title, summary.experience_date
                        ),
                    )
                });
                match target {
                    Some((id, status, prompt)) if status != BookingStatus::Cancelled => {
                        Mode::Confirming(Confirm {
                            prompt,
                            action: ConfirmAction::CancelBooking(id),
                        })
                    }
                    Some(_) => {
                        self.set_status("This booking is already cancelled.", StatusKind::Error);
                        Mode::Normal
                    }
                    None => {
                        self.set_status("No booking selected.", StatusKind::Error);
                        Mode::Normal
                    }
                }
            }
            _ => Mode::Normal,
        }
    }

    fn handle_moderation_key(&mut self, code: KeyCode) {
        let Screen::ManageExperiences(queue) = &mut self.screen else {
            return;
        };
        let target = match code {
            KeyCode::Char('s') => {
                queue.cycle_status();
                return;
            }
            KeyCode::Char('a') => ExperienceStatus::Approved,
            KeyCode::Char('r') => ExperienceStatus::Rejected,
            KeyCode::Char('p') => ExperienceStatus::Pending,
            _ => return,
        };
        let Some(id) = queue.current().map(|e| e.id) else {
            self.set_status("No experience selected.", StatusKind::Error);
            return;
        };
        let result = self.moderate(id, target);
        self.report(result);
    }

    fn handle_users_key(&mut self, code: KeyCode) -> Mode {
        let Screen::ManageUsers(users) = &mut self.screen else {
            return Mode::Normal;
        };
        match code {
            KeyCode::Char('r') => users.cycle_role(),
            KeyCode::Char('s') => users.cycle_status(),
            KeyCode::Char('+') => {
                return Mode::Editing {
                    purpose: FormPurpose::SignUp,
                    form: Form::sign_up(true),
                }
            }
            KeyCode::Char('u') | KeyCode::Char('o') => {
                let Some(profile) = users.current().cloned() else {
                    self.set_status("No user selected.", StatusKind::Error);
                    return Mode::Normal;
                };
                let result = if code == KeyCode::Char('u') {
                    self.toggle_suspension(&profile)
                } else {
                    self.rotate_role(&profile)
                };
                self.report(result);
            }
            _ => {}
        }
        Mode::Normal
    }

    fn handle_all_bookings_key(&mut self, code: KeyCode) -> Mode {
        let Screen::ManageBookings(all) = &mut self.screen else {
            return Mode::Normal;
        };
        match code {
            KeyCode::Char('s') => all.cycle_status(),
            KeyCode::Char('c') => {
                let Some(id) = all.current().map(|b| b.booking.id) else {
                    self.set_status("No booking selected.", StatusKind::Error);
                    return Mode::Normal;
                };
                let result = self.confirm_booking(id);
                self.report(result);
            }
            KeyCode::Char('-') => {
                let confirm = all.current().map(|summary| Confirm {
                    prompt: format!(
                        "Cancel {}'s booking for {}?",
                        summary.user_name, summary.experience_title
                    ),
                    action: ConfirmAction::CancelBooking(summary.booking.id),
                });
                match confirm {
                    Some(confirm) => return Mode::Confirming(confirm),
                    None => self.set_status("No booking selected.", StatusKind::Error),
                }
            }
            _ => {}
        }
        Mode::Normal
    }

    fn handle_dashboard_key(&mut self, code: KeyCode) {
        let today = self.today();
        let result = match code {
            KeyCode::Char('t') => match &mut self.screen {
                Screen::Dashboard(dashboard) => dashboard.next_range(&self.conn, today),
                _ => Ok(()),
            },
            KeyCode::Char('x') => self.export_stats(),
            _ => return,
        };
        self.report(result);
    }

    fn handle_form(&mut self, code: KeyCode, purpose: FormPurpose, mut form: Form) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.set_status(format!("{} cancelled.", purpose.title()), StatusKind::Info);
                return Ok(Mode::Normal);
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Left => form.cycle(-1),
            KeyCode::Right => form.cycle(1),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.submit_form(&purpose, &form) {
                Ok(()) => return Ok(Mode::Normal),
                Err(err) => {
                    let message = surface_error(&err);
                    match classify(&err) {
                        ErrorClass::Validation(validation) => form.fail(validation),
                        _ => form.fail(ValidationError::new("form", message.clone())),
                    }
                    warn!(form = %purpose.title(), error = %err, "form rejected");
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }
        Ok(Mode::Editing { purpose, form })
    }

    fn submit_form(&mut self, purpose: &FormPurpose, form: &Form) -> Result<()> {
        match purpose {
            FormPurpose::SignIn => {
                let email = form.email()?;
                let name = self.session.sign_in(&self.conn, &email)?.full_name.clone();
                self.set_status(format!("Welcome back, {name}."), StatusKind::Info);
            }
            FormPurpose::SignUp => {
                let profile = form.new_profile()?;
                let actor = self.session.user().cloned();
                let created = sign_up(&self.conn, &profile, actor.as_ref())?;
                if actor.is_some() {
                    self.set_status(
                        format!("Created account for {}.", created.full_name),
                        StatusKind::Info,
                    );
                } else {
                    self.session.sign_in(&self.conn, &created.email)?;
                    self.set_status(
                        format!("Welcome to ThaniLocal, {}.", created.full_name),
                        StatusKind::Info,
                    );
                }
            }
            FormPurpose::EditProfile => {
                let user = self.session.require_user()?.clone();
                let (update, avatar) = form.profile_update();
                let saved =
                    save_profile(&self.conn, &self.media, &user, &update, avatar.as_deref())?;
                self.session.update_user(saved);
                self.set_status("Profile saved.", StatusKind::Info);
            }
            FormPurpose::CreateExperience => {
                let host = self.session.require_host()?.clone();
                let (draft, images) = form.new_experience()?;
                let experience =
                    publish_experience(&self.conn, &self.media, &host, &draft, &images)?;
                self.set_status(
                    format!("Submitted \"{}\" for review.", experience.title),
                    StatusKind::Info,
                );
            }
            FormPurpose::Book(experience) => {
                let user_id = self.session.require_user()?.id;
                let participants = form.participants()?;
                let booking =
                    create_booking(&self.conn, user_id, experience.id, participants, self.today())?;
                self.set_status(
                    format!(
                        "Booked {} for {}. Total {}.",
                        participants,
                        experience.title,
                        format_money(booking.total_price)
                    ),
                    StatusKind::Info,
                );
            }
            FormPurpose::PlanItinerary => {
                let (request, policy) = form.itinerary_request()?;
                let outcome = generate_itinerary(&self.conn, &request, policy)?;
                let message = match &outcome {
                    ItineraryOutcome::NoCandidates => {
                        "No experiences match those categories and budget.".to_string()
                    }
                    ItineraryOutcome::Planned(days) => format!("Planned {} day(s).", days.len()),
                };
                self.screen = Screen::Itinerary(ItineraryScreen {
                    request,
                    outcome,
                    scroll: 0,
                });
                self.set_status(message, StatusKind::Info);
            }
        }
        Ok(())
    }

    fn handle_confirm(&mut self, code: KeyCode, confirm: Confirm) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Nothing changed.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                let result = match confirm.action {
                    ConfirmAction::CancelBooking(id) => self.cancel_booking(id),
                    ConfirmAction::SignOut => self.sign_out(),
                };
                self.report(result);
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::Confirming(confirm)),
        }
    }

    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Result<Mode> {
        let done = match code {
            KeyCode::Esc => {
                state.query.clear();
                true
            }
            KeyCode::Enter => true,
            KeyCode::Backspace => {
                state.query.pop();
                false
            }
            KeyCode::Char(ch) => {
                state.query.push(ch);
                false
            }
            _ => return Ok(Mode::Searching(state)),
        };

        if let Some(query) = self.query_mut() {
            query.clone_from(&state.query);
        }
        let today = self.today();
        if let Some((selection, _)) = self.selection_mut(today) {
            selection.first();
        }

        if done {
            Ok(Mode::Normal)
        } else {
            Ok(Mode::Searching(state))
        }
    }

    fn moderate(&mut self, id: i64, status: ExperienceStatus) -> Result<()> {
        self.session.require_admin()?;
        let experience = set_experience_status(&self.conn, id, status)?;
        self.set_status(
            format!("\"{}\" is now {}.", experience.title, experience.status),
            StatusKind::Info,
        );
        Ok(())
    }

    fn toggle_suspension(&mut self, profile: &Profile) -> Result<()> {
        let admin_id = self.session.require_admin()?.id;
        if profile.id == admin_id {
            return Err(
                BackendError::Conflict("You cannot suspend your own account.".into()).into(),
            );
        }
        let next = match profile.status {
            AccountStatus::Active => AccountStatus::Suspended,
            AccountStatus::Suspended => AccountStatus::Active,
        };
        let saved = set_profile_status(&self.conn, profile.id, next)?;
        self.set_status(
            format!("{} is now {}.", saved.full_name, saved.status),
            StatusKind::Info,
        );
        Ok(())
    }

    fn rotate_role(&mut self, profile: &Profile) -> Result<()> {
        let admin_id = self.session.require_admin()?.id;
        if profile.id == admin_id {
            return Err(
                BackendError::Conflict("You cannot change your own role.".into()).into(),
            );
        }
        let next = match profile.role {
            Role::Tourist => Role::Host,
            Role::Host => Role::Admin,
            Role::Admin => Role::Tourist,
        };
        let saved = set_profile_role(&self.conn, profile.id, next)?;
        self.set_status(
            format!("{} is now a {}.", saved.full_name, saved.role),
            StatusKind::Info,
        );
        Ok(())
    }

    fn confirm_booking(&mut self, id: i64) -> Result<()> {
        self.session.require_admin()?;
        set_booking_status(&self.conn, id, BookingStatus::Confirmed)?;
        self.set_status("Booking confirmed.", StatusKind::Info);
        Ok(())
    }

    fn cancel_booking(&mut self, id: i64) -> Result<()> {
        let booking =
            fetch_booking(&self.conn, id)?.ok_or(BackendError::NotFound { entity: "Booking" })?;
        self.session.authorize_cancel(&booking)?;
        cancel_booking(&self.conn, id)?;
        self.set_status("Booking cancelled.", StatusKind::Info);
        Ok(())
    }

    fn sign_out(&mut self) -> Result<()> {
        self.session.sign_out()?;
        self.screen = Screen::Home;
        self.set_status("Signed out.", StatusKind::Info);
        Ok(())
    }

    fn export_stats(&mut self) -> Result<()> {
        self.session.require_admin()?;
        let Screen::Dashboard(dashboard) = &self.screen else {
            return Ok(());
        };
        let path = export_dashboard(&dashboard.stats, &self.config.export_dir)?;
        match open_path(&path) {
            Ok(()) => self.set_status(format!("Exported {}.", path.display()), StatusKind::Info),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "could not open export");
                self.set_status(
                    format!("Exported {} (could not open it: {err}).", path.display()),
                    StatusKind::Info,
                );
            }
        }
        Ok(())
    }

    /// Pull pending store changes into the mounted screen. Screens that are
    /// not mounted fetch fresh data when opened, so only this one is updated.
    pub fn sync_realtime(&mut self) {
        let synced = self.apply_store_changes();
        self.report_sync(synced);
        let pruned = self.prune_journal_if_due(Instant::now());
        self.report_sync(pruned);
    }

    fn report_sync(&mut self, result: Result<()>) {
        if let Err(err) = result {
            warn!(error = %format!("{err:#}"), "failed to sync store changes");
            self.set_status(surface_error(&err), StatusKind::Error);
        }
    }

    /// The session refresh and the screen update run independently so a
    /// failure in one still lets the other see the whole batch.
    fn apply_store_changes(&mut self) -> Result<()> {
        let changes = self.feed.poll(&self.conn)?;
        if changes.is_empty() {
            return Ok(());
        }

        let refreshed = self.refresh_session_for(&changes);
        let applied = self.apply_to_screen(&changes);
        refreshed?;
        let applied = applied?;
        debug!(changes = changes.len(), applied, "store changes synced");
        Ok(())
    }

    fn refresh_session_for(&mut self, changes: &[RowChange]) -> Result<()> {
        let Some(user_id) = self.session.user().map(|u| u.id) else {
            return Ok(());
        };
        let touched = changes
            .iter()
            .any(|c| c.table == Table::Profiles && c.row_id == user_id);
        if !touched {
            return Ok(());
        }

        self.session.refresh(&self.conn)?;
        if !self.session.is_signed_in() {
            self.screen = Screen::Home;
            self.set_status("Your account is no longer active.", StatusKind::Error);
        }
        Ok(())
    }

    fn apply_to_screen(&mut self, changes: &[RowChange]) -> Result<usize> {
        let today = self.today();
        let applied = match &mut self.screen {
            Screen::Experiences(s) => s.apply_changes(&self.conn, changes)?,
            Screen::Marketplace(s) => s.apply_changes(&self.conn, changes)?,
            Screen::MyBookings(s) => s.apply_changes(&self.conn, changes, today)?,
            Screen::ManageExperiences(s) => s.apply_changes(&self.conn, changes)?,
            Screen::ManageUsers(s) => s.apply_changes(&self.conn, changes)?,
            Screen::ManageBookings(s) => s.apply_changes(&self.conn, changes)?,
            Screen::Dashboard(s) => {
                s.reload(&self.conn, today)?;
                changes.len()
            }
            Screen::Home | Screen::Itinerary(_) => 0,
        };
        Ok(applied)
    }

    fn prune_journal_if_due(&mut self, now: Instant) -> Result<()> {
        if now.saturating_duration_since(self.last_prune) < JOURNAL_PRUNE_INTERVAL {
            return Ok(());
        }
        self.last_prune = now;
        let removed = ChangeFeed::prune(&self.conn, JOURNAL_RETENTION_HOURS)?;
        debug!(removed, "change journal pruned");
        Ok(())
    }

    fn report(&mut self, result: Result<()>) {
        if let Err(err) = result {
            self.report_error(&err);
        }
    }

    fn report_error(&mut self, err: &anyhow::Error) {
        match classify(err) {
            ErrorClass::Unknown => warn!(error = %format!("{err:#}"), "action failed"),
            class => info!(?class, "action refused"),
        }
        self.set_status(surface_error(err), StatusKind::Error);
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_header(frame, chunks[0]);
        let content = chunks[1];
        match &self.screen {
            Screen::Home => self.draw_home(frame, content),
            Screen::Experiences(browse) => self.draw_experiences(frame, content, browse),
            Screen::Marketplace(market) => self.draw_marketplace(frame, content, market),
            Screen::MyBookings(bookings) => self.draw_my_bookings(frame, content, bookings),
            Screen::Itinerary(itinerary) => self.draw_itinerary(frame, content, itinerary),
            Screen::ManageExperiences(queue) => self.draw_moderation(frame, content, queue),
            Screen::ManageUsers(users) => self.draw_users(frame, content, users),
            Screen::ManageBookings(all) => self.draw_all_bookings(frame, content, all),
            Screen::Dashboard(dashboard) => self.draw_dashboard(frame, content, dashboard),
        }
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::Editing { purpose, form } => self.draw_form(frame, area, purpose, form),
            Mode::Confirming(confirm) => self.draw_confirm(frame, area, confirm),
            Mode::Searching(state) => self.draw_search_bar(frame, area, state),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let current = self.screen.nav_key();
        let mut spans = vec![Span::styled(
            "ThaniLocal ",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        )];
        for (key, label) in NAVIGATION {
            let style = if key == current {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::styled(format!(" {key} {label} "), style));
        }
        if let Some(user) = self.session.user() {
            spans.push(Span::styled(
                format!("  {} ({})", user.full_name, user.role),
                Style::default().fg(Color::Cyan),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_home(&self, frame: &mut Frame, area: Rect) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(Span::styled("Discover local experiences and artisan goods", bold)),
            Line::from(""),
        ];

        match self.session.user() {
            Some(user) => {
                let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".into());
                lines.extend([
                    Line::from(vec![Span::raw("Name:     "), Span::styled(user.full_name.clone(), bold)]),
                    Line::from(format!("Email:    {}", user.email)),
                    Line::from(format!("Role:     {}", user.role)),
                    Line::from(vec![
                        Span::raw("Status:   "),
                        Span::styled(user.status.to_string(), account_status_style(user.status)),
                    ]),
                    Line::from(format!("Phone:    {}", optional(&user.phone))),
                    Line::from(format!("Location: {}", optional(&user.location))),
                    Line::from(format!("Bio:      {}", optional(&user.bio))),
                    Line::from(format!("Avatar:   {}", optional(&user.avatar_url))),
                    Line::from(format!(
                        "Local:    {}",
                        if user.is_local { "yes" } else { "no" }
                    )),
                ]);
            }
            None => {
                lines.extend([
                    Line::from("You are browsing as a guest."),
                    Line::from(""),
                    Line::from("Demo accounts:"),
                    Line::from("  admin@thanilocal.test"),
                    Line::from("  host@thanilocal.test"),
                    Line::from("  tourist@thanilocal.test"),
                ]);
            }
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Account"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn draw_experiences(&self, frame: &mut Frame, area: Rect, browse: &ExperiencesScreen) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);

        let visible = browse.visible();
        let items = visible
            .iter()
            .map(|e| {
                ListItem::new(Line::from(vec![
                    Span::styled(e.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!(
                        "  {} · {} · {}",
                        e.location,
                        e.date,
                        format_money(e.price)
                    )),
                ]))
            })
            .collect();
        let title = titled_with_query("Experiences", &browse.filter.query, visible.len());
        draw_list(
            frame,
            chunks[0],
            title,
            items,
            browse.selection.index,
            "No experiences are open for booking.",
        );

        let detail = match browse.current() {
            Some(e) => experience_detail(e),
            None => vec![Line::from("Select an experience to see its details.")],
        };
        let paragraph = Paragraph::new(detail)
            .block(Block::default().borders(Borders::ALL).title("Details"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, chunks[1]);
    }

    fn draw_marketplace(&self, frame: &mut Frame, area: Rect, market: &MarketplaceScreen) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1)])
            .split(area);

        let filter = &market.filter;
        let summary = Line::from(vec![
            Span::raw("Category: "),
            Span::styled(
                filter.category.clone().unwrap_or_else(|| "all".into()),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw("   Artisan: "),
            Span::styled(
                filter.artisan.clone().unwrap_or_else(|| "all".into()),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw("   Price: "),
            Span::styled(market.price_label(), Style::default().fg(Color::Yellow)),
            Span::raw("   Sort: "),
            Span::styled(market.sort.label(), Style::default().fg(Color::Yellow)),
        ]);
        frame.render_widget(
            Paragraph::new(summary).block(Block::default().borders(Borders::ALL).title("Filters")),
            chunks[0],
        );

        let visible = market.visible();
        let items = visible
            .iter()
            .map(|p| {
                ListItem::new(Line::from(vec![
                    Span::styled(p.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!(
                        "  {} · by {} · {} · {} in stock · ★{:.1}",
                        p.category,
                        p.artisan_name,
                        format_money(p.price),
                        p.stock,
                        p.rating
                    )),
                ]))
            })
            .collect();
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        let title = titled_with_query("Marketplace", &filter.query, visible.len());
        draw_list(
            frame,
            panes[0],
            title,
            items,
            market.selection.index,
            "No products match these filters.",
        );

        let detail = match market.current() {
            Some(p) => product_detail(p),
            None => vec![Line::from("Select a product to see its details.")],
        };
        let paragraph = Paragraph::new(detail)
            .block(Block::default().borders(Borders::ALL).title("Details"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, panes[1]);
    }

    fn draw_my_bookings(&self, frame: &mut Frame, area: Rect, bookings: &BookingsScreen) {
        let today = self.today();
        let visible = bookings.visible(today);
        let items = visible
            .iter()
            .map(|b| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        b.experience_title.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(
                        "  {} · {} · host {} · {} people · {}  ",
                        b.experience_date,
                        b.location,
                        b.host_name,
                        b.booking.participants,
                        format_money(b.booking.total_price)
                    )),
                    Span::styled(
                        b.booking.status.to_string(),
                        booking_status_style(b.booking.status),
                    ),
                ]))
            })
            .collect();
        let tab = match bookings.tab {
            BookingTab::Upcoming => "Upcoming",
            BookingTab::Past => "Past",
        };
        draw_list(
            frame,
            area,
            format!("My bookings: {tab} ({})", visible.len()),
            items,
            bookings.selection.index,
            "No bookings here yet.",
        );
    }

    fn draw_itinerary(&self, frame: &mut Frame, area: Rect, itinerary: &ItineraryScreen) {
        let request = &itinerary.request;
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(format!(
                "{} to {} · budget {} · group of {} · {}",
                request.start,
                request.end,
                format_money(request.budget),
                request.group_size,
                request.categories.join(", ")
            )),
            Line::from(""),
        ];

        match &itinerary.outcome {
            ItineraryOutcome::NoCandidates => lines.push(Line::from(
                "No approved experiences match those categories within the budget.",
            )),
            ItineraryOutcome::Planned(days) if days.is_empty() => {
                lines.push(Line::from("Nothing fits into the first day of the trip."))
            }
            ItineraryOutcome::Planned(days) => {
                let mut total = 0.0;
                for (idx, day) in days.iter().enumerate() {
                    total += day.total_cost;
                    lines.push(Line::from(Span::styled(
                        format!(
                            "Day {} · {} · {} · {:.1}h",
                            idx + 1,
                            day.date,
                            format_money(day.total_cost),
                            day.total_duration
                        ),
                        bold,
                    )));
                    for activity in &day.activities {
                        lines.push(Line::from(format!(
                            "  • {} ({}) · {} × {} · {:.1}h",
                            activity.title,
                            activity.location,
                            format_money(activity.price),
                            request.group_size,
                            activity.duration_hours
                        )));
                    }
                }
                lines.push(Line::from(""));
                lines.push(Line::from(format!(
                    "Total {} of {} · {} left",
                    format_money(total),
                    format_money(request.budget),
                    format_money(request.budget - total)
                )));
            }
        }

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Itinerary"))
            .wrap(Wrap { trim: false })
            .scroll((itinerary.scroll, 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_moderation(&self, frame: &mut Frame, area: Rect, queue: &ManageExperiencesScreen) {
        let visible = queue.visible();
        let items = visible
            .iter()
            .map(|e| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<9}", e.status), experience_status_style(e.status)),
                    Span::styled(e.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!(
                        "  {} · {} · {} · {} · {}/{} booked",
                        e.category,
                        e.location,
                        e.date,
                        format_money(e.price),
                        e.current_participants,
                        e.max_participants
                    )),
                ]))
            })
            .collect();
        let status = queue
            .filter
            .status
            .map_or_else(|| "all".to_string(), |s| s.to_string());
        let title = titled_with_query(
            &format!("Experiences: {status}"),
            &queue.filter.query,
            visible.len(),
        );
        draw_list(
            frame,
            area,
            title,
            items,
            queue.selection.index,
            "Nothing waiting here.",
        );
    }

    fn draw_users(&self, frame: &mut Frame, area: Rect, users: &ManageUsersScreen) {
        let visible = users.visible();
        let items = visible
            .iter()
            .map(|p| {
                ListItem::new(Line::from(vec![
                    Span::styled(p.full_name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!("  <{}> · {}{} · ", p.email, p.role, if p.is_local { " · local" } else { "" })),
                    Span::styled(p.status.to_string(), account_status_style(p.status)),
                ]))
            })
            .collect();
        let role = users
            .filter
            .role
            .map_or_else(|| "all roles".to_string(), |r| r.to_string());
        let status = users
            .filter
            .status
            .map_or_else(|| "any status".to_string(), |s| s.to_string());
        let title = titled_with_query(
            &format!("Users: {role}, {status}"),
            &users.filter.query,
            visible.len(),
        );
        draw_list(
            frame,
            area,
            title,
            items,
            users.selection.index,
            "No users match.",
        );
    }

    fn draw_all_bookings(&self, frame: &mut Frame, area: Rect, all: &ManageBookingsScreen) {
        let visible = all.visible();
        let items = visible
            .iter()
            .map(|b| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<10}", b.booking.status),
                        booking_status_style(b.booking.status),
                    ),
                    Span::styled(
                        b.experience_title.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(
                        "  {} · booked {} · {} people · {}",
                        b.user_name,
                        b.booking.booking_date,
                        b.booking.participants,
                        format_money(b.booking.total_price)
                    )),
                ]))
            })
            .collect();
        let status = all.status.map_or_else(|| "all".to_string(), |s| s.to_string());
        draw_list(
            frame,
            area,
            format!("Bookings: {status} ({})", visible.len()),
            items,
            all.selection.index,
            "No bookings yet.",
        );
    }

    fn draw_dashboard(&self, frame: &mut Frame, area: Rect, dashboard: &DashboardScreen) {
        let stats = &dashboard.stats;
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let heading = |text: &str| Line::from(Span::styled(text.to_string(), bold));

        let mut lines = vec![
            heading("Overview"),
            Line::from(format!(
                "Users {} ({} active) · Experiences {} ({} pending) · Bookings {} · Revenue {}",
                stats.total_users,
                stats.active_users,
                stats.total_experiences,
                stats.pending_experiences,
                stats.total_bookings,
                format_money(stats.total_revenue)
            )),
            Line::from(vec![
                Span::raw("Bookings by status: "),
                Span::styled(
                    format!("{} confirmed", stats.bookings_by_status.confirmed),
                    booking_status_style(BookingStatus::Confirmed),
                ),
                Span::raw(" · "),
                Span::styled(
                    format!("{} pending", stats.bookings_by_status.pending),
                    booking_status_style(BookingStatus::Pending),
                ),
                Span::raw(" · "),
                Span::styled(
                    format!("{} cancelled", stats.bookings_by_status.cancelled),
                    booking_status_style(BookingStatus::Cancelled),
                ),
            ]),
            Line::from(""),
            heading("Popular locations"),
        ];
        for (location, count) in &stats.popular_locations {
            lines.push(Line::from(format!("  {location}: {count}")));
        }

        let metrics = &stats.sustainability;
        lines.extend([
            Line::from(""),
            heading("Sustainability"),
            Line::from(format!(
                "  Local hosts {:.1}% · Avg group {:.1} · Carbon {:.1} kg · Local spend {}",
                metrics.local_host_percentage,
                metrics.average_group_size,
                metrics.carbon_footprint,
                format_money(metrics.local_economic_impact)
            )),
            Line::from(format!(
                "  Cultural bookings {} · Certified sustainable {}",
                metrics.cultural_count, metrics.certified_count
            )),
            Line::from(""),
            heading("Booking trends"),
        ]);
        let max_bookings = stats
            .booking_trends
            .iter()
            .map(|d| d.bookings)
            .max()
            .unwrap_or(0) as f64;
        for day in &stats.booking_trends {
            lines.push(Line::from(format!(
                "  {} {:<width$} {:>3} {}",
                day.date,
                bar(day.bookings as f64, max_bookings, BAR_WIDTH),
                day.bookings,
                format_money(day.revenue),
                width = BAR_WIDTH
            )));
        }

        let new_users: u64 = stats.user_growth.iter().map(|d| d.count).sum();
        lines.push(Line::from(""));
        lines.push(heading(&format!("User growth ({new_users} new)")));
        for day in stats.user_growth.iter().filter(|d| d.count > 0) {
            lines.push(Line::from(format!("  {} +{}", day.date, day.count)));
        }

        lines.push(Line::from(""));
        lines.push(heading("Sustainability trends"));
        for day in stats
            .sustainability_trends
            .iter()
            .filter(|d| d.local_spending > 0.0 || d.carbon > 0.0)
        {
            lines.push(Line::from(format!(
                "  {} local {} · carbon {:.1} kg",
                day.date,
                format_money(day.local_spending),
                day.carbon
            )));
        }

        lines.push(Line::from(""));
        lines.push(heading("Recent bookings"));
        for recent in &stats.recent_bookings {
            lines.push(Line::from(vec![
                Span::raw(format!(
                    "  {} · {} · {} · ",
                    recent.user_name,
                    recent.experience_title,
                    format_money(recent.booking.total_price)
                )),
                Span::styled(
                    recent.booking.status.to_string(),
                    booking_status_style(recent.booking.status),
                ),
            ]));
        }

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Dashboard: {}", stats.range)),
            )
            .wrap(Wrap { trim: false })
            .scroll((dashboard.scroll, 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let pairs: &[(&str, &str)] = match (&self.screen, &self.mode) {
            (_, Mode::Editing { .. }) => &[
                ("Enter", "Submit"),
                ("Tab", "Next"),
                ("←→/Space", "Change"),
                ("Esc", "Cancel"),
            ],
            (_, Mode::Confirming(_)) => &[("y", "Yes"), ("n", "No")],
            (_, Mode::Searching(_)) => &[("Enter", "Keep"), ("Esc", "Clear")],
            (Screen::Home, _) if self.session.is_signed_in() => &[
                ("e", "Edit profile"),
                ("o", "Sign out"),
                ("1-0", "Go to"),
                ("q", "Quit"),
            ],
            (Screen::Home, _) => &[
                ("i", "Sign in"),
                ("u", "Sign up"),
                ("1-0", "Go to"),
                ("q", "Quit"),
            ],
            (Screen::Experiences(_), _) => &[
                ("↑↓", "Navigate"),
                ("Enter", "Book"),
                ("f", "Search"),
                ("Esc", "Home"),
            ],
            (Screen::Marketplace(_), _) => &[
                ("c", "Category"),
                ("a", "Artisan"),
                ("p", "Price"),
                ("s", "Sort"),
                ("x", "Clear"),
                ("f", "Search"),
            ],
            (Screen::MyBookings(_), _) => &[
                ("↑↓", "Navigate"),
                ("Tab", "Upcoming/Past"),
                ("-", "Cancel booking"),
                ("Esc", "Home"),
            ],
            (Screen::Itinerary(_), _) => &[("↑↓", "Scroll"), ("n", "New plan"), ("Esc", "Home")],
            (Screen::ManageExperiences(_), _) => &[
                ("a", "Approve"),
                ("r", "Reject"),
                ("p", "Back to pending"),
                ("s", "Status filter"),
                ("f", "Search"),
            ],
            (Screen::ManageUsers(_), _) => &[
                ("u", "Suspend/activate"),
                ("o", "Change role"),
                ("+", "Add user"),
                ("r", "Role filter"),
                ("s", "Status filter"),
                ("f", "Search"),
            ],
            (Screen::ManageBookings(_), _) => &[
                ("c", "Confirm"),
                ("-", "Cancel booking"),
                ("s", "Status filter"),
                ("Esc", "Home"),
            ],
            (Screen::Dashboard(_), _) => &[
                ("t", "Time range"),
                ("x", "Export CSV"),
                ("↑↓", "Scroll"),
                ("Esc", "Home"),
            ],
        };
        Line::from(
            pairs
                .iter()
                .flat_map(|(key, label)| key_hint(key, label))
                .collect::<Vec<_>>(),
        )
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, purpose: &FormPurpose, form: &Form) {
        let popup_area = centered_rect(70, 80, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(purpose.title())
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let paragraph = Paragraph::new(form.lines()).wrap(Wrap { trim: false });
        frame.render_widget(paragraph, inner);

        if let Some((x, y)) = form.cursor() {
            frame.set_cursor_position((inner.x + x, inner.y + y));
        }
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, confirm: &Confirm) {
        let popup_area = centered_rect(50, 20, area);
        frame.render_widget(Clear, popup_area);

        let lines = vec![
            Line::from(confirm.prompt.clone()),
            Line::from(""),
            Line::from(Span::styled(
                "y to confirm • n to go back",
                Style::default().fg(Color::Gray),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Confirm"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title("Search");
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }
}

fn titled_with_query(title: &str, query: &str, count: usize) -> String {
    let query = query.trim();
    if query.is_empty() {
        format!("{title} ({count})")
    } else {
        format!("{title} matching \"{query}\" ({count})")
    }
}

fn draw_list(
    frame: &mut Frame,
    area: Rect,
    title: String,
    items: Vec<ListItem<'static>>,
    selected: usize,
    empty: &str,
) {
    let block = Block::default().borders(Borders::ALL).title(title);
    if items.is_empty() {
        let message = Paragraph::new(empty.to_string())
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(message, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ListState::default();
    state.select(Some(selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn product_detail(p: &Product) -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            p.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(p.description.clone()),
        Line::from(""),
        Line::from(format!("Artisan:  {}", p.artisan_name)),
        Line::from(format!("Category: {}", p.category)),
        Line::from(format!("Price:    {}", format_money(p.price))),
        Line::from(format!("In stock: {}", p.stock)),
        Line::from(format!("Rating:   {:.1}/5", p.rating)),
        Line::from(format!(
            "Image:    {}",
            p.image_url.as_deref().unwrap_or("none")
        )),
    ]
}

fn experience_detail(e: &Experience) -> Vec<Line<'static>> {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    vec![
        Line::from(Span::styled(
            e.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(e.description.clone()),
        Line::from(""),
        Line::from(format!("Where:      {}", e.location)),
        Line::from(format!("When:       {} ({:.1}h)", e.date, e.duration_hours)),
        Line::from(format!("Category:   {}", e.category)),
        Line::from(format!("Price:      {} per person", format_money(e.price))),
        Line::from(format!(
            "Spots left: {} of {}",
            e.remaining_capacity(),
            e.max_participants
        )),
        Line::from(format!("Rating:     {:.1}/5", e.sustainability.rating)),
        Line::from(format!(
            "Cultural:   {} · Certified sustainable: {}",
            yes_no(e.sustainability.is_cultural),
            yes_no(e.sustainability.is_certified_sustainable)
        )),
        Line::from(format!("Photos:     {}", e.images.len())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        count_bookings, create_experience, fetch_experiences, fetch_profiles, open_in_memory,
        seed_demo_data, ExperienceQuery,
    };
    use crate::models::{NewExperience, Sustainability};

    fn app() -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_string_lossy().into_owned();
        let config =
            Config::from_lookup(|key| (key == "THANILOCAL_HOME").then(|| home.clone())).unwrap();
        let conn = open_in_memory().unwrap();
        seed_demo_data(&conn, Utc::now().date_naive()).unwrap();
        let session = Session::new(config.session_file.clone());
        (App::new(conn, config, session).unwrap(), dir)
    }

    fn press(app: &mut App, keys: &[KeyCode]) {
        for key in keys {
            app.handle_key(*key).unwrap();
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            app.handle_key(KeyCode::Char(ch)).unwrap();
        }
    }

    fn sign_in(app: &mut App, email: &str) {
        press(app, &[KeyCode::Char('1'), KeyCode::Char('i')]);
        type_text(app, email);
        press(app, &[KeyCode::Enter]);
        assert!(app.session.is_signed_in(), "{email} should be signed in");
    }

    fn status_text(app: &App) -> String {
        app.status
            .as_ref()
            .map(|s| s.text.clone())
            .unwrap_or_default()
    }

    #[test]
    fn guests_are_kept_out_of_admin_screens() {
        let (mut app, _dir) = app();
        press(&mut app, &[KeyCode::Char('7')]);
        assert!(matches!(app.screen, Screen::Home));
        assert_eq!(status_text(&app), "Please sign in first.");

        sign_in(&mut app, "tourist@thanilocal.test");
        press(&mut app, &[KeyCode::Char('0')]);
        assert!(matches!(app.screen, Screen::Home));
        assert_eq!(status_text(&app), "Access denied. Admin privileges required.");
    }

    #[test]
    fn unknown_email_stays_in_the_form() {
        let (mut app, _dir) = app();
        press(&mut app, &[KeyCode::Char('i')]);
        type_text(&mut app, "nobody@thanilocal.test");
        press(&mut app, &[KeyCode::Enter]);

        assert!(matches!(app.mode, Mode::Editing { .. }));
        assert_eq!(status_text(&app), "Account not found.");
    }

    #[test]
    fn tourist_books_from_the_browse_screen() {
        let (mut app, _dir) = app();
        sign_in(&mut app, "tourist@thanilocal.test");
        let before = count_bookings(&app.conn, None).unwrap();

        press(&mut app, &[KeyCode::Char('2'), KeyCode::Enter]);
        assert!(matches!(
            app.mode,
            Mode::Editing {
                purpose: FormPurpose::Book(_),
                ..
            }
        ));
        press(&mut app, &[KeyCode::Backspace]);
        type_text(&mut app, "2");
        press(&mut app, &[KeyCode::Enter]);

        assert!(matches!(app.mode, Mode::Normal));
        assert!(status_text(&app).starts_with("Booked 2 for"));
        assert_eq!(count_bookings(&app.conn, None).unwrap(), before + 1);
    }

    #[test]
    fn moderation_updates_the_live_list() {
        let (mut app, _dir) = app();
        sign_in(&mut app, "admin@thanilocal.test");
        press(&mut app, &[KeyCode::Char('7')]);
        let Screen::ManageExperiences(queue) = &app.screen else {
            panic!("moderation screen should be open");
        };
        assert_eq!(queue.visible().len(), 1);

        press(&mut app, &[KeyCode::Char('a')]);
        app.sync_realtime();

        let Screen::ManageExperiences(queue) = &app.screen else {
            panic!("moderation screen should stay open");
        };
        assert!(queue.visible().is_empty());
        let approved = fetch_experiences(&app.conn, &ExperienceQuery::bookable()).unwrap();
        assert_eq!(approved.len(), 5);
    }

    #[test]
    fn suspending_a_user_signs_them_out_on_next_sync() {
        let (mut app, _dir) = app();
        sign_in(&mut app, "tourist@thanilocal.test");
        let tourist = app.session.user().unwrap().id;

        set_profile_status(&app.conn, tourist, AccountStatus::Suspended).unwrap();
        app.sync_realtime();

        assert!(!app.session.is_signed_in());
        assert_eq!(status_text(&app), "Your account is no longer active.");
        let profiles = fetch_profiles(&app.conn).unwrap();
        assert!(profiles.iter().any(|p| p.status == AccountStatus::Suspended));
    }

    #[test]
    fn unreadable_row_does_not_hide_other_submissions() {
        let (mut app, _dir) = app();
        sign_in(&mut app, "admin@thanilocal.test");
        press(&mut app, &[KeyCode::Char('7')]);
        let experiences = fetch_experiences(&app.conn, &ExperienceQuery::default()).unwrap();
        let broken = experiences
            .iter()
            .find(|e| e.status == ExperienceStatus::Pending)
            .unwrap()
            .clone();

        app.conn
            .execute(
                "UPDATE experiences SET images = 'not json' WHERE id = ?1",
                [broken.id],
            )
            .unwrap();
        let draft = NewExperience {
            title: "Night market food walk".into(),
            description: "Six stalls, one evening".into(),
            location: "Chiang Mai".into(),
            category: "food".into(),
            price: 18.0,
            duration_hours: 3.0,
            date: broken.date,
            max_participants: 8,
            sustainability: Sustainability::default(),
        };
        let fresh = create_experience(&app.conn, broken.creator_id, &draft).unwrap();
        app.sync_realtime();

        let Screen::ManageExperiences(queue) = &app.screen else {
            panic!("moderation screen should stay open");
        };
        assert!(queue.visible().iter().any(|e| e.id == fresh.id));
        assert!(!status_text(&app).is_empty());

        app.conn
            .execute("UPDATE experiences SET images = '[]' WHERE id = ?1", [broken.id])
            .unwrap();
        app.sync_realtime();

        let Screen::ManageExperiences(queue) = &app.screen else {
            panic!("moderation screen should stay open");
        };
        let mut shown: Vec<i64> = queue.visible().iter().map(|e| e.id).collect();
        shown.sort_unstable();
        let mut expected = vec![broken.id, fresh.id];
        expected.sort_unstable();
        assert_eq!(shown, expected);
    }

    #[test]
    fn journal_is_pruned_once_the_interval_has_passed() {
        let (mut app, _dir) = app();
        let stale = |conn: &Connection| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM change_log WHERE changed_at < datetime('now', '-1 day')",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };
        app.conn
            .execute(
                "INSERT INTO change_log (table_name, op, row_id, changed_at) \
                 VALUES ('products', 'INSERT', 1, datetime('now', '-2 days'))",
                [],
            )
            .unwrap();

        app.sync_realtime();
        assert_eq!(stale(&app.conn), 1);

        let start = app.last_prune;
        app.prune_journal_if_due(start + JOURNAL_PRUNE_INTERVAL)
            .unwrap();
        assert_eq!(stale(&app.conn), 0);
        assert_eq!(app.last_prune, start + JOURNAL_PRUNE_INTERVAL);
    }

    #[test]
    fn search_narrows_and_escape_clears() {
        let (mut app, _dir) = app();
        press(&mut app, &[KeyCode::Char('2'), KeyCode::Char('f')]);
        type_text(&mut app, "zzz-no-match");
        let Screen::Experiences(browse) = &app.screen else {
            panic!("browse screen should be open");
        };
        assert!(browse.visible().is_empty());

        press(&mut app, &[KeyCode::Esc]);
        let Screen::Experiences(browse) = &app.screen else {
            panic!("browse screen should be open");
        };
        assert_eq!(browse.visible().len(), 4);
        assert!(matches!(app.mode, Mode::Normal));
    }
}
