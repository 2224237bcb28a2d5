use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};

use agenda_plus::app::{Agenda, Notice, NoticeKind};
use agenda_plus::attachment::Attachment;
use agenda_plus::calendar;
use agenda_plus::config::Config;
use agenda_plus::db::Database;
use agenda_plus::logger;
use agenda_plus::models::{NewAssignment, ScheduleEvent, StudyPlan};
use agenda_plus::openai::OpenAiClient;
use agenda_plus::profile::{Preference, Profile};
use agenda_plus::store::{AssignmentsStore, GradesStore, Snapshot};
use agenda_plus::views::{self, Emphasis};

type Db = Arc<Database>;

#[derive(Parser)]
#[command(name = "agenda", version, about = "Agenda+: assignments, grades and study plans")]
struct Cli {
    /// SQLite file holding the agenda (overrides AGENDA_DB_PATH).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer the first-run name prompt.
    Setup {
        #[arg(long)]
        name: String,
    },

    /// Show the current user.
    Whoami,

    /// Add an assignment described in plain language (uses the AI).
    Add {
        /// e.g. "Write essay for history class due next Friday"
        text: String,
    },

    /// Add an assignment field by field.
    New {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "Uncategorized")]
        course: String,
        /// Due date, YYYY-MM-DD.
        #[arg(long)]
        due: NaiveDate,
        #[arg(long)]
        details: Option<String>,
    },

    /// List assignments, soonest first.
    List {
        /// Include completed assignments and show everything, not just the next few.
        #[arg(long)]
        all: bool,
    },

    /// Show this week's deadlines.
    Week,

    /// Mark an assignment done, or not done again.
    Toggle { id: String },

    /// Import assignments from a syllabus (uses the AI).
    ImportSyllabus {
        /// Syllabus document or image to upload.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Pasted syllabus text.
        text: Option<String>,
    },

    /// Import grades pasted from the grade portal (uses the AI).
    ImportGrades {
        /// Text file with the copied portal page.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        text: Option<String>,
    },

    /// Show course grades and the estimated GPA.
    Grades,

    /// Suggest a study plan for open assignments (uses the AI).
    Plan {
        /// JSON file with fixed commitments (list of schedule events).
        #[arg(long)]
        commitments: Option<PathBuf>,
        /// Also write the plan as an .ics file.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show the last saved study plan.
    ShowPlan {
        /// Write the saved plan as an .ics file.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Read or change a saved preference.
    Pref {
        key: PrefKey,
        /// New value; an empty string clears it.
        value: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PrefKey {
    PortalUrl,
    MeetingLink,
}

impl From<PrefKey> for Preference {
    fn from(key: PrefKey) -> Self {
        match key {
            PrefKey::PortalUrl => Preference::PortalUrl,
            PrefKey::MeetingLink => Preference::MeetingLink,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logging();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let storage: Db = Arc::new(
        Database::new(&config.db_path).context("Failed to initialize database")?,
    );
    tracing::debug!(path = %config.db_path, "Opened agenda database");

    match cli.command {
        Commands::Setup { name } => {
            let profile = Profile::new(storage);
            match profile.create_user(&name)? {
                Some(user) => println!("Welcome, {}!", user.name),
                None => bail!("Name must not be empty"),
            }
        }
        Commands::Whoami => match Profile::new(storage).user() {
            Some(user) => println!("{} ({})", user.name, user.initials()),
            None => println!("No profile yet. Run `agenda setup --name <NAME>`."),
        },
        Commands::Add { text } => {
            let mut agenda = open_agenda(&config, storage)?;
            let pending = agenda.parse_assignment(&text).await;
            report_or_exit(agenda.accept_assignment(pending));
        }
        Commands::New {
            title,
            course,
            due,
            details,
        } => {
            let mut store = AssignmentsStore::new(storage);
            store.hydrate();
            let added = store.add(
                NewAssignment {
                    title,
                    course,
                    due_date: due.and_time(NaiveTime::MIN),
                    details,
                },
                Local::now().naive_local(),
            )?;
            println!("Added \"{}\" ({} priority) [{}]", added.title, added.priority, added.id);
        }
        Commands::List { all } => {
            let mut store = AssignmentsStore::new(storage.clone());
            store.hydrate();
            greet(&Profile::new(storage));
            print_assignments(&store, all);
        }
        Commands::Week => {
            let mut store = AssignmentsStore::new(storage);
            store.hydrate();
            let Snapshot::Ready(items) = store.snapshot() else {
                println!("Loading assignments...");
                return Ok(());
            };
            for day in views::week_deadlines(items, Local::now().date_naive()) {
                let titles: Vec<_> = day.assignments.iter().map(|a| a.title.as_str()).collect();
                println!("{}  {}", day.day.format("%a %d"), titles.join(", "));
            }
        }
        Commands::Toggle { id } => {
            let mut store = AssignmentsStore::new(storage);
            store.hydrate();
            if store.toggle(&id)? {
                let done = store.get(&id).map(|a| a.completed).unwrap_or(false);
                println!("{} is now {}", id, if done { "completed" } else { "open" });
            } else {
                println!("No assignment with id {}", id);
            }
        }
        Commands::ImportSyllabus { file, text } => {
            let mut agenda = open_agenda(&config, storage)?;
            let pending = match (file, text) {
                (Some(path), _) => agenda.parse_syllabus_file(Attachment::from_path(&path)?).await,
                (None, text) => agenda.parse_syllabus_text(&text.unwrap_or_default()).await,
            };
            report_or_exit(agenda.accept_syllabus(pending));
        }
        Commands::ImportGrades { file, text } => {
            let text = match file {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => text.unwrap_or_default(),
            };
            let mut agenda = open_agenda(&config, storage)?;
            let pending = agenda.parse_grades(&text).await;
            report_or_exit(agenda.accept_grades(pending));
        }
        Commands::Grades => {
            let mut grades = GradesStore::new(storage);
            grades.hydrate();
            let Snapshot::Ready(courses) = grades.snapshot() else {
                println!("Loading grades...");
                return Ok(());
            };
            if courses.is_empty() {
                println!("No grades yet. Import them with `agenda import-grades`.");
            }
            for course in courses {
                println!("{:<30} {:>6.1}", course.name, course.grade);
            }
            println!("Your current estimated GPA is {}", views::gpa(courses));
        }
        Commands::Plan {
            commitments,
            export,
        } => {
            let commitments: Vec<ScheduleEvent> = match commitments {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str(&raw).context("Commitments file is not a list of events")?
                }
                None => Vec::new(),
            };
            let mut agenda = open_agenda(&config, storage)?;
            let pending = agenda.suggest_schedule(&commitments).await;
            if let Some((notice, plan)) = agenda.accept_schedule(pending) {
                report_or_exit(Some(notice));
                if let Some(plan) = plan {
                    print_plan(&plan);
                    if let Some(path) = export {
                        write_ics(&plan, &path)?;
                    }
                }
            }
        }
        Commands::ShowPlan { export } => match Profile::new(storage).study_plan() {
            Some(plan) => {
                print_plan(&plan);
                if let Some(path) = export {
                    write_ics(&plan, &path)?;
                }
            }
            None => println!("No saved study plan. Generate one with `agenda plan`."),
        },
        Commands::Pref { key, value } => {
            let profile = Profile::new(storage);
            let pref = Preference::from(key);
            match value {
                Some(value) => profile.set_preference(pref, &value)?,
                None => println!("{}", profile.preference(pref).unwrap_or_default()),
            }
        }
    }

    Ok(())
}

fn open_agenda(config: &Config, storage: Db) -> Result<Agenda<Db, OpenAiClient>> {
    let client = OpenAiClient::from_config(config)?;
    Ok(Agenda::new(storage, client))
}

fn greet(profile: &Profile<Db>) {
    match profile.user() {
        Some(user) => println!("Welcome back, {}!", user.name),
        None => println!("Tip: run `agenda setup --name <NAME>` to personalise your agenda."),
    }
}

/// Prints the notice. Returns false for an error notice.
fn report(notice: Option<Notice>) -> bool {
    let Some(notice) = notice else {
        return true;
    };
    match notice.kind {
        NoticeKind::Error => {
            eprintln!("{}: {}", notice.title, notice.description);
            false
        }
        NoticeKind::Success | NoticeKind::Info => {
            println!("{}: {}", notice.title, notice.description);
            true
        }
    }
}

fn report_or_exit(notice: Option<Notice>) {
    if !report(notice) {
        std::process::exit(1);
    }
}

fn print_assignments(store: &AssignmentsStore<Db>, all: bool) {
    let items = match store.snapshot() {
        Snapshot::Loading => {
            println!("Loading assignments...");
            return;
        }
        Snapshot::Ready(items) => items,
    };

    let now = Local::now().naive_local();
    let mut shown: Vec<_> = if all {
        items.iter().collect()
    } else {
        views::upcoming(items, views::UPCOMING_LIMIT)
    };
    shown.sort_by_key(|a| a.due_date);

    if shown.is_empty() {
        println!("All caught up! Add an assignment with `agenda add`.");
        return;
    }
    for assignment in shown {
        let marker = match views::priority_weight(assignment.priority) {
            Emphasis::Prominent => "!!",
            Emphasis::Default => "! ",
            Emphasis::Subtle => "  ",
        };
        let check = if assignment.completed { "x" } else { " " };
        println!(
            "[{}] {} {:<32} {:<20} {:<16} {}",
            check,
            marker,
            assignment.title,
            assignment.course,
            views::due_bucket(assignment.due_date, now).to_string(),
            assignment.id
        );
    }
}

fn print_plan(plan: &StudyPlan) {
    for block in &plan.blocks {
        println!(
            "{:<10} {}-{}  {}",
            block.day, block.start_time, block.end_time, block.assignment
        );
    }
    println!("\n{}", plan.reasoning);
}

fn write_ics(plan: &StudyPlan, path: &Path) -> Result<()> {
    let ics = calendar::export_plan(plan)?;
    fs::write(path, ics).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Saved calendar to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(kind: NoticeKind) -> Notice {
        Notice {
            kind,
            title: "Title".to_string(),
            description: "Description".to_string(),
        }
    }

    #[test]
    fn only_error_notices_report_failure() {
        assert!(report(None));
        assert!(report(Some(notice(NoticeKind::Success))));
        assert!(report(Some(notice(NoticeKind::Info))));
        assert!(!report(Some(notice(NoticeKind::Error))));
    }
}
