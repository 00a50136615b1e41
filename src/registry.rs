//! Static registry of portal resources.
//!
//! A read-only, ordered catalog of the resources the assistant may query,
//! with the descriptions and schema hints the router's path-selection prompt
//! is built from. Content maintenance is out of scope; `builtin()` mirrors
//! the portal's current catalog.

pub const STUDENTS_PATH: &str = "/nova-api/students";
pub const FACULTIES_PATH: &str = "/nova-api/faculties";
pub const DEPARTMENTS_PATH: &str = "/nova-api/departments";
pub const EVENTS_PATH: &str = "/nova-api/student-activity-masters";
pub const ACHIEVEMENTS_PATH: &str = "/nova-api/student-achievement-loggers";
pub const FEEDBACKS_PATH: &str = "/nova-api/academic-feedbacks";
pub const FACULTY_MAPPINGS_PATH: &str = "/nova-api/academic-course-faculty-mappings";
pub const PERIODICALS_PATH: &str = "/nova-api/periodical-statuses";
pub const PAPER_REPORTS_PATH: &str = "/nova-api/student-paper-presentation-reports";
pub const INTERNSHIP_REPORTS_PATH: &str = "/nova-api/internship-reports";

/// One addressable portal resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub path: &'static str,
    pub description: &'static str,
    pub schema_hint: &'static str,
    pub category: &'static str,
}

/// Ordered, path-unique collection of resource descriptors.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    entries: Vec<ResourceDescriptor>,
}

impl ResourceRegistry {
    pub fn new(entries: Vec<ResourceDescriptor>) -> Self {
        Self { entries }
    }

    /// The portal catalog this assistant ships with.
    pub fn builtin() -> Self {
        Self::new(vec![
            ResourceDescriptor {
                path: FACULTY_MAPPINGS_PATH,
                description: "Faculty-course assignments and teaching schedules. Use for 'who teaches X', 'my current teachers', or course-faculty relationships. NOT for individual faculty profiles.",
                schema_hint: "Mapping objects with 'faculties', 'academic_courses', 'student_department_id', 'student_semester', 'status'.",
                category: "Academics",
            },
            ResourceDescriptor {
                path: FEEDBACKS_PATH,
                description: "Academic feedback and evaluations: course feedback, faculty feedback, or feedback for assessment periods.",
                schema_hint: "Feedback objects with 'students', 'academic_course_faculty_mappings', 'faculty_message', 'syllabus_coverage', 'overall_satisfication_level'.",
                category: "Academics",
            },
            ResourceDescriptor {
                path: PERIODICALS_PATH,
                description: "Periodical assessment and exam status tracking: exam schedules, PT1/PT2/Model/Semester exam status, semester-wise assessment calendar.",
                schema_hint: "Status objects with 'periodical_name', 'semester', 'status', 'start_date', 'end_date'.",
                category: "Academics",
            },
            ResourceDescriptor {
                path: DEPARTMENTS_PATH,
                description: "All academic departments and their ids. Use for department listings or as a reference for filtering other resources by department.",
                schema_hint: "Department objects with 'id' and 'name'.",
                category: "Master Entries",
            },
            ResourceDescriptor {
                path: STUDENTS_PATH,
                description: "Student profiles. Primary endpoint for student lookup by name, roll number, or enrollment number; supports department-based filtering. Use for 'who is', 'find student', or 'students in department'.",
                schema_hint: "Student objects with 'id', 'name', 'roll_no', 'enroll_no', 'email', 'department', 'batch', 'semester'.",
                category: "People",
            },
            ResourceDescriptor {
                path: FACULTIES_PATH,
                description: "Individual faculty profiles and personal details: 'who is [FACULTY]', employee id, contact, department or designation of a faculty member.",
                schema_hint: "Faculty objects with 'id', 'name', 'employee_id', 'department', 'designation', 'email'.",
                category: "People",
            },
            ResourceDescriptor {
                path: EVENTS_PATH,
                description: "College events, activities, and competitions catalog. Find events by name, type (hackathon, workshop), category, organizer, or location.",
                schema_hint: "Event objects with 'event_name', 'event_code', 'organizer', 'event_category', 'status', 'start_date', 'end_date', 'location'.",
                category: "Student Activities",
            },
            ResourceDescriptor {
                path: ACHIEVEMENTS_PATH,
                description: "Personal student achievement records. Use specifically for 'my achievements', 'my participations', 'my activities'.",
                schema_hint: "Achievement log objects with 'students', 'event_category', 'from_date', 'to_date', 'mode_of_participate', 'iqac_verification'.",
                category: "Student Activities",
            },
            ResourceDescriptor {
                path: PAPER_REPORTS_PATH,
                description: "Student paper presentation records: research papers, conference presentations, publication status and verification.",
                schema_hint: "Paper objects with 'paper_title', 'start_date', 'end_date', 'status', 'iqac_verification'.",
                category: "Student Reports",
            },
            ResourceDescriptor {
                path: INTERNSHIP_REPORTS_PATH,
                description: "Student internship experiences: company details, sector, stipend, location, and verification status.",
                schema_hint: "Internship objects with 'sector', 'city', 'state', 'country', 'stipend_amount', 'is_aicte', 'iqac_verification'.",
                category: "Student Reports",
            },
        ])
    }

    pub fn entries(&self) -> &[ResourceDescriptor] {
        &self.entries
    }

    pub fn find(&self, path: &str) -> Option<&ResourceDescriptor> {
        self.entries.iter().find(|d| d.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Numbered listing used in the path-selection prompt.
    pub fn format_for_prompt(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| {
                format!(
                    "{}. Path: {}\n   Description: {}\n   Data Hint: {}",
                    i + 1,
                    d.path,
                    d.description,
                    d.schema_hint
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_paths_are_unique() {
        let registry = ResourceRegistry::builtin();
        let mut paths: Vec<_> = registry.entries().iter().map(|d| d.path).collect();
        let total = paths.len();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), total);
    }

    #[test]
    fn lookup_by_path() {
        let registry = ResourceRegistry::builtin();
        assert!(registry.contains(STUDENTS_PATH));
        assert!(!registry.contains("/nova-api/unknown"));
        assert_eq!(registry.find(DEPARTMENTS_PATH).unwrap().category, "Master Entries");
    }

    #[test]
    fn prompt_listing_mentions_every_path() {
        let registry = ResourceRegistry::builtin();
        let listing = registry.format_for_prompt();
        for descriptor in registry.entries() {
            assert!(listing.contains(descriptor.path));
        }
    }
}
